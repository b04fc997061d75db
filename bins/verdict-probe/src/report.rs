// Per-scenario result lines and the final exit status

use std::io::{self, Stdout, Write};
use std::process::ExitCode;
use tracing::{info, warn};
use verdict_probe_common::types::{AttemptStatus, ExpectedStatuses};

use crate::client::Rejection;

/// Every selected scenario passed
pub const EXIT_SUCCESS: u8 = 0;
/// The run completed and at least one scenario failed
pub const EXIT_SCENARIO_FAILURE: u8 = 1;
/// The run aborted on an infrastructure or setup failure
pub const EXIT_ABORTED: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Passed {
        observed: AttemptStatus,
    },
    Mismatch {
        observed: AttemptStatus,
        expected: ExpectedStatuses,
        detail: Option<String>,
    },
    SubmitFailed(Rejection),
    Unstable {
        first: AttemptStatus,
        then: AttemptStatus,
    },
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, ScenarioOutcome::Passed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn exit_code(&self) -> u8 {
        if self.failed == 0 {
            EXIT_SUCCESS
        } else {
            EXIT_SCENARIO_FAILURE
        }
    }
}

impl From<RunSummary> for ExitCode {
    fn from(summary: RunSummary) -> Self {
        ExitCode::from(summary.exit_code())
    }
}

/// Writes one line per scenario and remembers whether anything failed.
pub struct ResultReporter<W: Write = Stdout> {
    out: W,
    total: usize,
    failed: usize,
}

impl ResultReporter<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ResultReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            total: 0,
            failed: 0,
        }
    }

    /// Print the scenario name before its (possibly slow) submission
    pub fn begin(&mut self, name: &str) {
        self.emit(format_args!("Test: {} -> ", name), false);
    }

    pub fn record(&mut self, name: &str, outcome: &ScenarioOutcome) {
        self.total += 1;
        if !outcome.passed() {
            self.failed += 1;
        }

        match outcome {
            ScenarioOutcome::Passed { observed } => {
                info!(scenario = name, status = %observed, "Scenario passed");
                self.emit(format_args!("PASS [{}]", observed), true);
            }
            ScenarioOutcome::Mismatch {
                observed,
                expected,
                detail,
            } => {
                warn!(scenario = name, status = %observed, expected = %expected, "Scenario failed");
                self.emit(
                    format_args!("FAIL. Got {}, expected {}", observed, expected),
                    true,
                );
                if let Some(detail) = detail {
                    self.emit(format_args!("    {}", detail.trim()), true);
                }
            }
            ScenarioOutcome::SubmitFailed(rejection) => {
                warn!(scenario = name, status = rejection.status, "Scenario submit failed");
                self.emit(format_args!("Submit Failed: {}", rejection), true);
            }
            ScenarioOutcome::Unstable { first, then } => {
                warn!(scenario = name, first = %first, then = %then, "Scenario status unstable");
                self.emit(
                    format_args!("FAIL. Status changed from {} to {}", first, then),
                    true,
                );
            }
        }
    }

    pub fn any_failed(&self) -> bool {
        self.failed > 0
    }

    /// Print the final marker. Call after teardown.
    pub fn finish(mut self) -> RunSummary {
        let summary = RunSummary {
            total: self.total,
            failed: self.failed,
        };
        if summary.failed == 0 {
            self.emit(format_args!("\n>>> SUCCESS <<<"), true);
        } else {
            self.emit(
                format_args!(
                    "\n>>> FAILURE ({}/{} scenarios failed) <<<",
                    summary.failed, summary.total
                ),
                true,
            );
        }
        summary
    }

    /// Output is best effort; a closed stdout must not abort the run
    fn emit(&mut self, args: std::fmt::Arguments<'_>, newline: bool) {
        let written = if newline {
            writeln!(self.out, "{}", args)
        } else {
            write!(self.out, "{}", args)
        };
        if let Err(e) = written.and_then(|_| self.out.flush()) {
            warn!(error = %e, "Failed to write report output");
        }
    }
}
