// Scenario loop: one submit-then-poll cycle at a time, in table order

use std::io::Write;
use tracing::{info, instrument};
use verdict_probe_common::types::Scenario;

use crate::auth::Session;
use crate::error::Result;
use crate::fixture::Fixture;
use crate::poller::{SubmissionPoller, Submission};
use crate::report::{ResultReporter, ScenarioOutcome};
use crate::scenarios::Prelude;

/// Compare what the judge said against what the scenario allows.
pub fn judge(scenario: &Scenario, submission: Submission) -> ScenarioOutcome {
    match submission {
        Submission::Rejected(rejection) => ScenarioOutcome::SubmitFailed(rejection),
        Submission::Unstable { first, then, .. } => ScenarioOutcome::Unstable { first, then },
        Submission::Settled { status, detail, .. } => {
            if scenario.expected.admits(&status) {
                ScenarioOutcome::Passed { observed: status }
            } else {
                ScenarioOutcome::Mismatch {
                    observed: status,
                    expected: scenario.expected.clone(),
                    detail,
                }
            }
        }
    }
}

pub struct ScenarioRunner<'a> {
    poller: SubmissionPoller<'a>,
    prelude: Prelude,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(poller: SubmissionPoller<'a>, prelude: Prelude) -> Self {
        Self { poller, prelude }
    }

    /// Run every scenario, recording each outcome. A failed scenario does
    /// not stop the loop; an `Err` from the poller does.
    #[instrument(skip_all, fields(login = session.login(), course_id = fixture.course_id, problem_id = fixture.problem_id))]
    pub async fn run<W: Write>(
        &self,
        session: &Session,
        fixture: &Fixture,
        scenarios: &[Scenario],
        reporter: &mut ResultReporter<W>,
    ) -> Result<()> {
        info!(scenarios = scenarios.len(), "Running scenarios");

        for scenario in scenarios {
            reporter.begin(&scenario.name);

            let code = self.prelude.assemble(&scenario.code);
            let submission = self
                .poller
                .submit_and_wait(session, fixture, self.prelude.language(), &code)
                .await?;

            reporter.record(&scenario.name, &judge(scenario, submission));
        }
        Ok(())
    }
}
