mod auth;
mod client;
mod error;
mod fixture;
mod poller;
mod readiness;
mod report;
mod runner;
mod scenarios;

use clap::{Parser, Subcommand, ValueEnum};
use std::future::Future;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use verdict_probe_common::config::{
    HarnessConfig, DEFAULT_API_URL, DEFAULT_COURSE_NAME, DEFAULT_LESSON_NAME, DEFAULT_LOGIN,
    DEFAULT_PASSWORD, DEFAULT_PROBLEM_NAME,
};
use verdict_probe_common::retry::{Clock, RetryPolicy, TokioClock};
use verdict_probe_common::types::Scenario;

use client::HttpJudgeApi;
use error::{HarnessError, Result};
use fixture::{Fixture, FixturePlan, FixtureStore, PgFixtureStore};
use poller::SubmissionPoller;
use readiness::{ReadinessGate, ReadinessProbe};
use report::{ResultReporter, RunSummary, EXIT_ABORTED};
use runner::ScenarioRunner;
use scenarios::Prelude;

#[derive(Parser)]
#[command(name = "verdict-probe")]
#[command(about = "Verdict Probe - black-box conformance checks for a remote judge", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Log output format (logs go to stderr)
    #[arg(long, global = true, value_enum, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed a fixture, run every scenario against the judge, tear down
    Run {
        /// Only run scenarios whose name contains this text (repeatable)
        #[arg(long)]
        only: Vec<String>,
    },

    /// Remove a fixture and user left over from an interrupted run
    Teardown,

    /// Print the scenario table without contacting anything
    List,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(clap::Args)]
struct Settings {
    /// Judge API base URL
    #[arg(long, global = true, env = "API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, global = true, env = "DB_HOST", default_value = "postgres")]
    db_host: String,

    #[arg(long, global = true, env = "DB_PORT", default_value = "5432")]
    db_port: u16,

    #[arg(long, global = true, env = "DB_USER", default_value = "problum")]
    db_user: String,

    #[arg(long, global = true, env = "DB_PASS", default_value = "problum", hide_env_values = true)]
    db_pass: String,

    #[arg(long, global = true, env = "DB_NAME", default_value = "problum")]
    db_name: String,

    /// Login of the throwaway user; deleted at teardown
    #[arg(long, global = true, env = "TEST_LOGIN", default_value = DEFAULT_LOGIN)]
    login: String,

    #[arg(long, global = true, env = "TEST_PASSWORD", default_value = DEFAULT_PASSWORD, hide_env_values = true)]
    password: String,

    /// Name of the seeded course; deleted at teardown
    #[arg(long, global = true, env = "FIXTURE_COURSE", default_value = DEFAULT_COURSE_NAME)]
    course_name: String,

    #[arg(long, global = true, env = "FIXTURE_LESSON", default_value = DEFAULT_LESSON_NAME)]
    lesson_name: String,

    #[arg(long, global = true, env = "FIXTURE_PROBLEM", default_value = DEFAULT_PROBLEM_NAME)]
    problem_name: String,

    /// Readiness attempts per dependency
    #[arg(long, global = true, default_value = "15")]
    ready_attempts: u32,

    #[arg(long, global = true, default_value = "1000")]
    ready_interval_ms: u64,

    /// Status reads per attempt before giving up
    #[arg(long, global = true, default_value = "30")]
    poll_attempts: u32,

    #[arg(long, global = true, default_value = "500")]
    poll_interval_ms: u64,

    #[arg(long, global = true, default_value = "10")]
    request_timeout_secs: u64,

    /// Bound on a single API liveness probe or database connection attempt
    #[arg(long, global = true, env = "PROBE_TIMEOUT_MS", default_value = "1000")]
    probe_timeout_ms: u64,

    /// Skip re-reading an attempt after it turns terminal
    #[arg(long, global = true, default_value = "false")]
    no_recheck: bool,
}

impl Settings {
    fn into_config(self) -> HarnessConfig {
        let mut config = HarnessConfig::default();

        config.api.base_url = self.api_url;
        config.api.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config.api.probe_timeout = Duration::from_millis(self.probe_timeout_ms);
        config.database.connect_timeout = Duration::from_millis(self.probe_timeout_ms);
        config.database.host = self.db_host;
        config.database.port = self.db_port;
        config.database.user = self.db_user;
        config.database.password = self.db_pass;
        config.database.name = self.db_name;
        config.identity.login = self.login;
        config.identity.password = self.password;
        config.fixture.course = self.course_name;
        config.fixture.lesson = self.lesson_name;
        config.fixture.problem = self.problem_name;
        config.readiness = RetryPolicy::new(
            self.ready_attempts,
            Duration::from_millis(self.ready_interval_ms),
        );
        config.polling = RetryPolicy::new(
            self.poll_attempts,
            Duration::from_millis(self.poll_interval_ms),
        );
        config.recheck_terminal = !self.no_recheck;

        config
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = cli.settings.into_config();
    let command = cli.command.unwrap_or(Commands::Run { only: Vec::new() });

    match command {
        Commands::List => {
            list_scenarios();
            ExitCode::SUCCESS
        }
        Commands::Teardown => match teardown_leftovers(&config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "Teardown failed");
                ExitCode::from(EXIT_ABORTED)
            }
        },
        Commands::Run { only } => match run(&config, &only).await {
            Ok(summary) => summary.into(),
            Err(e) => {
                error!(error = %e, "Run aborted");
                println!("\n>>> ABORTED: {} <<<", e);
                ExitCode::from(EXIT_ABORTED)
            }
        },
    }
}

/// The whole lifecycle: readiness, seed, authenticate, scenarios, teardown.
async fn run(config: &HarnessConfig, only: &[String]) -> Result<RunSummary> {
    info!("Verdict probe starting...");

    let prelude = Prelude::for_language(&config.language).ok_or_else(|| {
        HarnessError::Config(format!("no helper prelude for language '{}'", config.language))
    })?;
    let scenarios = scenarios::select(scenarios::default_scenarios(), only);
    if scenarios.is_empty() {
        return Err(HarnessError::Config(format!(
            "no scenario matches {:?}",
            only
        )));
    }

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let api = HttpJudgeApi::new(&config.api)?;
    let store = PgFixtureStore::new(&config.database, config.readiness, clock.clone());

    info!(
        api = %api.routes().base_url(),
        database = %config.database.redacted_url(),
        "Waiting for dependencies"
    );
    let dependencies: [&dyn ReadinessProbe; 2] = [&api, &store];
    ReadinessGate::new(config.readiness, clock.as_ref())
        .wait_all(&dependencies)
        .await?;

    let plan = FixturePlan::sum_two(config);
    let runner = ScenarioRunner::new(
        SubmissionPoller::new(&api, clock.as_ref(), config.polling, config.recheck_terminal),
        prelude,
    );
    let mut reporter = ResultReporter::stdout();

    let api_ref = &api;
    let runner_ref = &runner;
    let scenarios_ref = scenarios.as_slice();
    let reporter_ref = &mut reporter;
    fixture::with_fixture(&store, &plan, &config.identity.login, move |fixture| async move {
        tokio::select! {
            result = authenticated_phase(api_ref, config, &fixture, runner_ref, scenarios_ref, reporter_ref) => result,
            _ = interrupt(signal::ctrl_c()) => {
                warn!("Interrupt received, tearing down...");
                Err(HarnessError::Interrupted)
            }
        }
    })
    .await?;

    if reporter.any_failed() {
        warn!("At least one scenario failed");
    }
    Ok(reporter.finish())
}

/// Resolves once the signal fires. If the handler could not be installed
/// this never resolves, so the run carries on uninterruptible.
async fn interrupt<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn authenticated_phase<W: Write>(
    api: &HttpJudgeApi,
    config: &HarnessConfig,
    fixture: &Fixture,
    runner: &ScenarioRunner<'_>,
    scenarios: &[Scenario],
    reporter: &mut ResultReporter<W>,
) -> Result<()> {
    let session = auth::register_and_login(api, &config.identity, fixture).await?;
    runner.run(&session, fixture, scenarios, reporter).await
}

async fn teardown_leftovers(config: &HarnessConfig) -> Result<()> {
    let store = PgFixtureStore::new(&config.database, config.readiness, Arc::new(TokioClock));
    store
        .teardown(&config.fixture.course, &config.identity.login)
        .await?;

    println!(
        "✅ Removed course '{}' and user '{}' (if they existed)",
        config.fixture.course, config.identity.login
    );
    Ok(())
}

fn list_scenarios() {
    let scenarios = scenarios::default_scenarios();

    println!("📋 Scenarios:\n");
    println!("{:<24} {}", "Name", "Expected");
    println!("{}", "─".repeat(40));
    for scenario in &scenarios {
        println!("{:<24} {}", scenario.name, scenario.expected);
    }
    println!("\nTotal: {} scenario(s)", scenarios.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["verdict-probe"]).unwrap();
        assert!(cli.command.is_none());

        let config = cli.settings.into_config();
        let defaults = HarnessConfig::default();
        assert_eq!(config.readiness, defaults.readiness);
        assert_eq!(config.polling, defaults.polling);
        assert_eq!(config.identity.login, defaults.identity.login);
        assert_eq!(config.fixture.course, defaults.fixture.course);
        assert_eq!(config.fixture.lesson, defaults.fixture.lesson);
        assert_eq!(config.fixture.problem, defaults.fixture.problem);
        assert_eq!(config.api.probe_timeout, defaults.api.probe_timeout);
        assert_eq!(config.database.connect_timeout, defaults.database.connect_timeout);
        assert!(config.recheck_terminal);
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "verdict-probe",
            "--api-url",
            "http://localhost:8080",
            "--poll-attempts",
            "5",
            "--no-recheck",
            "--lesson-name",
            "Lesson A",
            "--problem-name",
            "Sum Three",
            "--probe-timeout-ms",
            "250",
            "run",
            "--only",
            "MLE",
            "--only",
            "TO",
        ])
        .unwrap();

        match &cli.command {
            Some(Commands::Run { only }) => assert_eq!(only, &["MLE", "TO"]),
            _ => panic!("expected run"),
        }
        let config = cli.settings.into_config();
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.polling.max_attempts, 5);
        assert!(!config.recheck_terminal);
        assert_eq!(config.fixture.lesson, "Lesson A");
        assert_eq!(config.fixture.problem, "Sum Three");
        assert_eq!(config.api.probe_timeout, Duration::from_millis(250));
        assert_eq!(config.database.connect_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_settings_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "verdict-probe",
            "teardown",
            "--db-host",
            "x",
            "--course-name",
            "Leftover Course",
        ])
        .unwrap();

        assert!(matches!(cli.command, Some(Commands::Teardown)));
        let config = cli.settings.into_config();
        assert_eq!(config.database.host, "x");
        assert_eq!(config.fixture.course, "Leftover Course");
    }

    #[tokio::test]
    async fn test_interrupt_fires_on_signal() {
        let fired = tokio::time::timeout(Duration::from_secs(1), interrupt(async { Ok(()) })).await;
        assert!(fired.is_ok());
    }

    #[tokio::test]
    async fn test_missing_signal_handler_is_not_an_interrupt() {
        let failed = async { Err(io::Error::new(io::ErrorKind::Other, "no signal driver")) };
        let fired = tokio::time::timeout(Duration::from_millis(50), interrupt(failed)).await;
        assert!(fired.is_err());
    }
}
