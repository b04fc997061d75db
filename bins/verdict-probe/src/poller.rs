//! Submit a code variant and wait for its verdict.
//!
//! Judging is asynchronous: the submit call only hands back an attempt id,
//! and the verdict shows up later on the attempt resource. The poller reads
//! that resource at a fixed interval until it turns terminal or the poll
//! budget runs out.

use tracing::{debug, info, warn};
use verdict_probe_common::retry::{drive, Clock, Outcome, Probe, RetryPolicy};
use verdict_probe_common::types::{AttemptStatus, SubmitRequest};

use crate::auth::Session;
use crate::client::{JudgeApi, Rejection, Reply};
use crate::error::{HarnessError, Result};
use crate::fixture::Fixture;

/// What became of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The submit call itself was refused; nothing was polled.
    Rejected(Rejection),
    /// Polling finished. `status` is `Pending` when the budget ran out.
    Settled {
        attempt_id: i64,
        status: AttemptStatus,
        detail: Option<String>,
        polls: u32,
    },
    /// A terminal status was followed by a different read.
    Unstable {
        attempt_id: i64,
        first: AttemptStatus,
        then: AttemptStatus,
    },
}

pub struct SubmissionPoller<'a> {
    api: &'a dyn JudgeApi,
    clock: &'a dyn Clock,
    policy: RetryPolicy,
    recheck_terminal: bool,
}

impl<'a> SubmissionPoller<'a> {
    pub fn new(
        api: &'a dyn JudgeApi,
        clock: &'a dyn Clock,
        policy: RetryPolicy,
        recheck_terminal: bool,
    ) -> Self {
        Self {
            api,
            clock,
            policy,
            recheck_terminal,
        }
    }

    /// Transport errors while polling are returned as `Err` and abort the
    /// run; everything else is folded into a `Submission`.
    pub async fn submit_and_wait(
        &self,
        session: &Session,
        fixture: &Fixture,
        language: &str,
        code: &str,
    ) -> Result<Submission> {
        let request = SubmitRequest {
            language: language.to_string(),
            code: code.to_string(),
        };

        let reply = self
            .api
            .submit(session.token(), fixture.course_id, fixture.problem_id, &request)
            .await?;
        let attempt_id = match reply {
            Reply::Accepted(response) => response.attempt_id,
            Reply::Rejected(rejection) => {
                warn!(status = rejection.status, "Submission rejected");
                return Ok(Submission::Rejected(rejection));
            }
        };
        debug!(attempt_id, source_size = code.len(), "Submission accepted");

        let api = self.api;
        let token = session.token();
        let outcome = drive(self.policy, self.clock, |poll| async move {
            let view = api.attempt(token, attempt_id).await?;
            debug!(attempt_id, poll, status = %view.status, "Polled attempt");
            Ok::<_, HarnessError>(match view.status {
                AttemptStatus::Pending => Probe::NotYet(view.status.to_string()),
                AttemptStatus::Terminal(_) => Probe::Ready(view),
            })
        })
        .await?;

        let (view, polls) = match outcome {
            Outcome::Succeeded { value, attempts } => (value, attempts),
            Outcome::Exhausted { attempts, .. } => {
                warn!(attempt_id, polls = attempts, "Attempt still pending after poll budget");
                return Ok(Submission::Settled {
                    attempt_id,
                    status: AttemptStatus::Pending,
                    detail: None,
                    polls: attempts,
                });
            }
        };
        info!(attempt_id, polls, status = %view.status, "Attempt settled");

        if self.recheck_terminal {
            let again = self.api.attempt(token, attempt_id).await?;
            if again.status != view.status {
                warn!(
                    attempt_id,
                    first = %view.status,
                    then = %again.status,
                    "Terminal status changed on re-read"
                );
                return Ok(Submission::Unstable {
                    attempt_id,
                    first: view.status,
                    then: again.status,
                });
            }
        }

        Ok(Submission::Settled {
            attempt_id,
            status: view.status,
            detail: view.error_message,
            polls,
        })
    }
}
