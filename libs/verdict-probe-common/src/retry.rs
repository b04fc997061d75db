//! Bounded retry as an explicit state machine.
//!
//! A [`RetryBudget`] moves from `Probing` to either `Succeeded` or
//! `Exhausted` and never leaves a final state. [`drive`] runs an async probe
//! against a budget, sleeping through a [`Clock`] between attempts so tests
//! can substitute a clock that does not wait.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// A fixed number of attempts at a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// `attempts` probes have failed so far and budget remains
    Probing { attempts: u32 },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryBudget {
    pub fn new(policy: RetryPolicy) -> Self {
        let state = if policy.max_attempts == 0 {
            RetryState::Exhausted { attempts: 0 }
        } else {
            RetryState::Probing { attempts: 0 }
        };
        Self { policy, state }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn is_probing(&self) -> bool {
        matches!(self.state, RetryState::Probing { .. })
    }

    pub fn record_success(&mut self) {
        if let RetryState::Probing { attempts } = self.state {
            self.state = RetryState::Succeeded {
                attempts: attempts + 1,
            };
        }
    }

    pub fn record_failure(&mut self) {
        if let RetryState::Probing { attempts } = self.state {
            let attempts = attempts + 1;
            self.state = if attempts >= self.policy.max_attempts {
                RetryState::Exhausted { attempts }
            } else {
                RetryState::Probing { attempts }
            };
        }
    }
}

/// Source of delays between attempts.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Ready(T),
    /// Not there yet; the string says why and is kept for the final report
    NotYet(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last: Option<String> },
}

/// Run `probe` until it is ready or the budget runs out.
///
/// An `Err` from the probe is not retried; it ends the loop immediately.
/// No sleep follows the final attempt.
pub async fn drive<T, E, F, Fut>(
    policy: RetryPolicy,
    clock: &dyn Clock,
    mut probe: F,
) -> Result<Outcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Probe<T>, E>>,
{
    let mut budget = RetryBudget::new(policy);
    let mut last = None;

    while let RetryState::Probing { attempts } = budget.state() {
        match probe(attempts + 1).await? {
            Probe::Ready(value) => {
                budget.record_success();
                let attempts = match budget.state() {
                    RetryState::Succeeded { attempts } => attempts,
                    _ => attempts + 1,
                };
                return Ok(Outcome::Succeeded { value, attempts });
            }
            Probe::NotYet(reason) => {
                last = Some(reason);
                budget.record_failure();
                if budget.is_probing() {
                    clock.sleep(policy.interval).await;
                }
            }
        }
    }

    let attempts = match budget.state() {
        RetryState::Exhausted { attempts } => attempts,
        _ => policy.max_attempts,
    };
    Ok(Outcome::Exhausted { attempts, last })
}

/// Records requested sleeps instead of waiting. Lets callers assert on
/// pacing without spending wall-clock time.
#[derive(Debug, Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        match self.sleeps.lock() {
            Ok(sleeps) => sleeps.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        match self.sleeps.lock() {
            Ok(mut sleeps) => sleeps.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}
