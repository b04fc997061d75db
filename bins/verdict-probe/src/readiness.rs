//! Blocks until the judge API and the database accept connections.
//!
//! Both come up asynchronously next to the harness, so each one is probed
//! on its own budget before anything is allocated. Exhausting a budget is
//! fatal and there is nothing to clean up yet.

use async_trait::async_trait;
use tracing::{info, warn};
use verdict_probe_common::retry::{drive, Clock, Outcome, Probe, RetryPolicy};

use crate::error::{HarnessError, Result};

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Short name used in logs and in the unreachable error
    fn dependency(&self) -> &'static str;

    async fn check(&self) -> anyhow::Result<()>;
}

pub struct ReadinessGate<'a> {
    policy: RetryPolicy,
    clock: &'a dyn Clock,
}

impl<'a> ReadinessGate<'a> {
    pub fn new(policy: RetryPolicy, clock: &'a dyn Clock) -> Self {
        Self { policy, clock }
    }

    /// Probe each dependency in order, each with a full budget.
    pub async fn wait_all(&self, probes: &[&dyn ReadinessProbe]) -> Result<()> {
        for probe in probes {
            self.wait_for(*probe).await?;
        }
        Ok(())
    }

    /// Returns the number of attempts it took.
    pub async fn wait_for(&self, probe: &dyn ReadinessProbe) -> Result<u32> {
        let dependency = probe.dependency();
        let max_attempts = self.policy.max_attempts;

        let outcome = drive(self.policy, self.clock, |attempt| async move {
            match probe.check().await {
                Ok(()) => Ok::<_, HarnessError>(Probe::Ready(())),
                Err(e) => {
                    warn!(
                        dependency,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Waiting for dependency..."
                    );
                    Ok(Probe::NotYet(format!("{:#}", e)))
                }
            }
        })
        .await?;

        match outcome {
            Outcome::Succeeded { attempts, .. } => {
                info!(dependency, attempts, "Dependency ready");
                Ok(attempts)
            }
            Outcome::Exhausted { attempts, last } => Err(HarnessError::Unreachable {
                dependency,
                attempts,
                last_error: last.unwrap_or_else(|| "no attempt was made".to_string()),
            }),
        }
    }
}
