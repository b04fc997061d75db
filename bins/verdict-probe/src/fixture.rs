//! Fixture Lifecycle
//!
//! **Responsibility:**
//! Seed the course → lesson → problem → template → tests graph that every
//! scenario submits against, and remove it together with the throwaway user
//! once the run is over.
//!
//! **Guarantees:**
//! - Seeding is one statement inside one transaction: either the problem is
//!   fully runnable (template and tests attached) or nothing exists.
//! - `with_fixture` tears down on every exit path of the body: success,
//!   error, and panic.
//! - Teardown deletes by natural key and is idempotent.
//!
//! The harness depends only on `FixtureStore`; `PgFixtureStore` writes
//! straight to the backend's Postgres, bypassing the API.

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::types::Json;
use sqlx::Connection;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use verdict_probe_common::config::{DatabaseConfig, FixtureNames, HarnessConfig, ProblemLimits};
use verdict_probe_common::retry::{drive, Clock, Outcome, Probe, RetryPolicy};
use verdict_probe_common::types::{Parameter, TemplateMetadata, TestCaseSpec};

use crate::error::{HarnessError, Result};
use crate::readiness::ReadinessProbe;

/// Identifiers of a seeded fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixture {
    pub course_id: i64,
    pub problem_id: i64,
}

/// Everything needed to create the fixture
#[derive(Debug, Clone)]
pub struct FixturePlan {
    pub names: FixtureNames,
    pub limits: ProblemLimits,
    pub language: String,
    pub template_code: String,
    pub metadata: TemplateMetadata,
    pub tests: Vec<TestCaseSpec>,
}

impl FixturePlan {
    /// The "sum two integers" problem the scenario table is written against
    pub fn sum_two(config: &HarnessConfig) -> Self {
        Self {
            names: config.fixture.clone(),
            limits: config.limits,
            language: config.language.clone(),
            template_code: "// Sum func\nfunc Sum(a, b int) int {\n return 0 \n}".to_string(),
            metadata: TemplateMetadata {
                function_name: "Sum".to_string(),
                parameters: vec![
                    Parameter { name: "a".to_string(), ty: "int".to_string() },
                    Parameter { name: "b".to_string(), ty: "int".to_string() },
                ],
                return_type: "int".to_string(),
            },
            tests: vec![
                TestCaseSpec { input: json!({"a": 1, "b": 2}), output: json!(3) },
                TestCaseSpec { input: json!({"a": -1, "b": 1}), output: json!(0) },
            ],
        }
    }

    /// Postgres interval literal for the problem's time limit
    pub fn time_limit_interval(&self) -> String {
        format!("{} milliseconds", self.limits.time_limit.as_millis())
    }
}

#[async_trait]
pub trait FixtureStore: Send + Sync {
    /// Create the whole fixture atomically.
    async fn seed(&self, plan: &FixturePlan) -> Result<Fixture>;

    /// Delete the course (cascading to its children) and the user.
    /// Missing rows are not an error.
    async fn teardown(&self, course_name: &str, login: &str) -> Result<()>;
}

/// Seed, run `body`, then tear down whatever happened inside `body`.
///
/// A failed seed is torn down too, since part of it may have committed.
/// A teardown failure is logged and does not replace the body's result.
/// A panic in the body is resumed after teardown.
pub async fn with_fixture<T, F, Fut>(
    store: &dyn FixtureStore,
    plan: &FixturePlan,
    login: &str,
    body: F,
) -> Result<T>
where
    F: FnOnce(Fixture) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let fixture = match store.seed(plan).await {
        Ok(fixture) => fixture,
        Err(e) => {
            release(store, plan, login).await;
            return Err(e);
        }
    };
    info!(
        course_id = fixture.course_id,
        problem_id = fixture.problem_id,
        course = %plan.names.course,
        "Fixture seeded"
    );

    let outcome = AssertUnwindSafe(body(fixture)).catch_unwind().await;

    release(store, plan, login).await;

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

async fn release(store: &dyn FixtureStore, plan: &FixturePlan, login: &str) {
    match store.teardown(&plan.names.course, login).await {
        Ok(()) => info!(course = %plan.names.course, login, "Fixture torn down"),
        Err(e) => error!(
            course = %plan.names.course,
            login,
            error = %e,
            "Teardown failed; fixture and user may be left behind"
        ),
    }
}

/// Run one connection attempt, giving up after `limit`
async fn within<T, E: std::fmt::Display>(
    limit: Duration,
    attempt: impl Future<Output = std::result::Result<T, E>>,
) -> std::result::Result<T, String> {
    match tokio::time::timeout(limit, attempt).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("no answer within {:?}", limit)),
    }
}

const SEED_FIXTURE: &str = r#"
WITH course_ins AS (
    INSERT INTO courses (name, description, tags, status)
    VALUES ($1, 'Test Desc', '{"test"}', 'published') RETURNING id
),
lesson_ins AS (
    INSERT INTO lessons (course_id, name, description, position, content)
    VALUES ((SELECT id FROM course_ins), $2, 'Desc', 1, 'Content') RETURNING id
),
problem_ins AS (
    INSERT INTO problems (lesson_id, name, statement, difficulty, time_limit, memory_limit)
    VALUES ((SELECT id FROM lesson_ins), $3, 'Sum a+b', 'easy', $4::interval, $5) RETURNING id
),
template_ins AS (
    INSERT INTO templates (problem_id, language, code, metadata)
    VALUES ((SELECT id FROM problem_ins), $6, $7, $8)
),
test_ins AS (
    INSERT INTO tests (problem_id, tests)
    VALUES ((SELECT id FROM problem_ins), $9)
)
SELECT id FROM problem_ins
"#;

const COURSE_OF_PROBLEM: &str = "SELECT lessons.course_id FROM lessons \
     JOIN problems ON lessons.id = problems.lesson_id WHERE problems.id = $1";

const DELETE_COURSE: &str = "DELETE FROM courses WHERE name = $1";
const DELETE_USER: &str = "DELETE FROM users WHERE login = $1";

/// Fixture store writing directly to the backend's Postgres.
///
/// A connection is opened per phase and closed before the phase returns.
pub struct PgFixtureStore {
    options: PgConnectOptions,
    connect_timeout: Duration,
    connect_policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl PgFixtureStore {
    pub fn new(config: &DatabaseConfig, connect_policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .ssl_mode(PgSslMode::Disable);

        Self {
            options,
            connect_timeout: config.connect_timeout,
            connect_policy,
            clock,
        }
    }

    async fn connect(&self) -> Result<PgConnection> {
        let options = &self.options;
        let limit = self.connect_timeout;
        let outcome = drive(self.connect_policy, self.clock.as_ref(), |attempt| async move {
            match within(limit, PgConnection::connect_with(options)).await {
                Ok(conn) => Ok::<_, HarnessError>(Probe::Ready(conn)),
                Err(e) => {
                    debug!(attempt, error = %e, "Database connection attempt failed");
                    Ok(Probe::NotYet(e))
                }
            }
        })
        .await?;

        match outcome {
            Outcome::Succeeded { value, .. } => Ok(value),
            Outcome::Exhausted { attempts, last } => Err(HarnessError::Unreachable {
                dependency: "database",
                attempts,
                last_error: last.unwrap_or_else(|| "no attempt was made".to_string()),
            }),
        }
    }
}

#[async_trait]
impl FixtureStore for PgFixtureStore {
    async fn seed(&self, plan: &FixturePlan) -> Result<Fixture> {
        let mut conn = self.connect().await?;

        let mut tx = conn.begin().await?;
        let (problem_id,): (i32,) = sqlx::query_as(SEED_FIXTURE)
            .bind(&plan.names.course)
            .bind(&plan.names.lesson)
            .bind(&plan.names.problem)
            .bind(plan.time_limit_interval())
            .bind(plan.limits.memory_limit_bytes)
            .bind(&plan.language)
            .bind(&plan.template_code)
            .bind(Json(&plan.metadata))
            .bind(Json(&plan.tests))
            .fetch_one(&mut *tx)
            .await?;
        let (course_id,): (i32,) = sqlx::query_as(COURSE_OF_PROBLEM)
            .bind(problem_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "Closing the seed connection failed");
        }

        Ok(Fixture {
            course_id: course_id.into(),
            problem_id: problem_id.into(),
        })
    }

    async fn teardown(&self, course_name: &str, login: &str) -> Result<()> {
        let mut conn = self.connect().await?;

        let mut tx = conn.begin().await?;
        let courses = sqlx::query(DELETE_COURSE)
            .bind(course_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let users = sqlx::query(DELETE_USER)
            .bind(login)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Closing the teardown connection failed");
        }

        debug!(courses, users, "Teardown deleted rows");
        Ok(())
    }
}

#[async_trait]
impl ReadinessProbe for PgFixtureStore {
    fn dependency(&self) -> &'static str {
        "database"
    }

    async fn check(&self) -> anyhow::Result<()> {
        let conn = within(self.connect_timeout, PgConnection::connect_with(&self.options))
            .await
            .map_err(anyhow::Error::msg)?;
        conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Keeps course names and logins the way the real tables key them
    #[derive(Default)]
    struct MemoryStore {
        courses: Mutex<Vec<String>>,
        users: Mutex<Vec<String>>,
        teardowns: Mutex<u32>,
        fail_teardown: bool,
        /// Keep the course but report the seed as failed
        fail_after_insert: bool,
    }

    impl MemoryStore {
        fn with_user(login: &str) -> Self {
            let store = Self::default();
            store.users.lock().unwrap().push(login.to_string());
            store
        }
    }

    #[async_trait]
    impl FixtureStore for MemoryStore {
        async fn seed(&self, plan: &FixturePlan) -> Result<Fixture> {
            let mut courses = self.courses.lock().unwrap();
            courses.push(plan.names.course.clone());
            if self.fail_after_insert {
                return Err(HarnessError::Database(sqlx::Error::RowNotFound));
            }
            Ok(Fixture {
                course_id: courses.len() as i64,
                problem_id: 100 + courses.len() as i64,
            })
        }

        async fn teardown(&self, course_name: &str, login: &str) -> Result<()> {
            *self.teardowns.lock().unwrap() += 1;
            if self.fail_teardown {
                return Err(HarnessError::Unreachable {
                    dependency: "database",
                    attempts: 1,
                    last_error: "connection refused".to_string(),
                });
            }
            self.courses.lock().unwrap().retain(|c| c != course_name);
            self.users.lock().unwrap().retain(|u| u != login);
            Ok(())
        }
    }

    fn plan() -> FixturePlan {
        FixturePlan::sum_two(&HarnessConfig::default())
    }

    #[test]
    fn test_sum_two_plan_matches_limits() {
        let plan = plan();
        assert_eq!(plan.time_limit_interval(), "2000 milliseconds");
        assert_eq!(plan.limits.memory_limit_bytes, 67_108_864);
        assert_eq!(plan.metadata.function_name, "Sum");
        assert_eq!(plan.tests.len(), 2);
        assert_eq!(plan.tests[0].output, json!(3));
    }

    #[test]
    fn test_seed_statement_returns_problem_id() {
        assert!(SEED_FIXTURE.trim_end().ends_with("SELECT id FROM problem_ins"));
        for param in 1..=9 {
            assert!(SEED_FIXTURE.contains(&format!("${param}")), "missing ${param}");
        }
    }

    #[tokio::test]
    async fn test_teardown_runs_after_success() {
        let store = MemoryStore::with_user("test_whitebox");
        let plan = plan();

        let seen = with_fixture(&store, &plan, "test_whitebox", |fixture| async move {
            Ok(fixture)
        })
        .await
        .unwrap();

        assert_eq!(seen, Fixture { course_id: 1, problem_id: 101 });
        assert!(store.courses.lock().unwrap().is_empty());
        assert!(store.users.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_runs_after_error() {
        let store = MemoryStore::with_user("test_whitebox");
        let plan = plan();

        let result: Result<()> = with_fixture(&store, &plan, "test_whitebox", |_| async {
            Err(HarnessError::Authentication {
                login: "test_whitebox".to_string(),
                status: 401,
                body: "invalid credentials".to_string(),
            })
        })
        .await;

        assert!(matches!(result, Err(HarnessError::Authentication { status: 401, .. })));
        assert_eq!(*store.teardowns.lock().unwrap(), 1);
        assert!(store.courses.lock().unwrap().is_empty());
        assert!(store.users.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_runs_after_panic() {
        let store = MemoryStore::with_user("test_whitebox");
        let plan = plan();

        let caught = AssertUnwindSafe(with_fixture(&store, &plan, "test_whitebox", |_| async {
            if true {
                panic!("scenario loop blew up");
            }
            Ok(())
        }))
        .catch_unwind()
        .await;

        assert!(caught.is_err());
        assert_eq!(*store.teardowns.lock().unwrap(), 1);
        assert!(store.courses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_seed_is_torn_down() {
        let store = MemoryStore {
            fail_after_insert: true,
            ..MemoryStore::with_user("test_whitebox")
        };
        let plan = plan();
        let mut body_ran = false;

        let result = with_fixture(&store, &plan, "test_whitebox", |_| {
            body_ran = true;
            async { Ok(()) }
        })
        .await;

        assert!(matches!(result, Err(HarnessError::Database(sqlx::Error::RowNotFound))));
        assert!(!body_ran);
        assert_eq!(*store.teardowns.lock().unwrap(), 1);
        assert!(store.courses.lock().unwrap().is_empty());
        assert!(store.users.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_attempt_is_bounded() {
        let stalled = within(
            Duration::from_millis(20),
            std::future::pending::<std::result::Result<(), sqlx::Error>>(),
        )
        .await;
        assert!(stalled.unwrap_err().contains("no answer within"));

        let refused = within(Duration::from_secs(1), async {
            Err::<(), _>(sqlx::Error::PoolTimedOut)
        })
        .await;
        assert_eq!(refused.unwrap_err(), sqlx::Error::PoolTimedOut.to_string());
    }

    #[tokio::test]
    async fn test_teardown_failure_keeps_body_result() {
        let store = MemoryStore {
            fail_teardown: true,
            ..MemoryStore::default()
        };
        let plan = plan();

        let value = with_fixture(&store, &plan, "test_whitebox", |_| async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(*store.teardowns.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let store = MemoryStore::with_user("test_whitebox");
        let plan = plan();
        store.seed(&plan).await.unwrap();

        store.teardown("WhiteBox Test Course", "test_whitebox").await.unwrap();
        store.teardown("WhiteBox Test Course", "test_whitebox").await.unwrap();

        assert!(!store.courses.lock().unwrap().iter().any(|c| c == "WhiteBox Test Course"));
        assert!(!store.users.lock().unwrap().iter().any(|u| u == "test_whitebox"));
    }

    #[tokio::test]
    async fn test_unreachable_database_fails_within_budget() {
        let clock = Arc::new(verdict_probe_common::retry::RecordingClock::default());
        let config = DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..DatabaseConfig::default()
        };
        let store = PgFixtureStore::new(
            &config,
            RetryPolicy::new(2, Duration::from_millis(5)),
            clock.clone(),
        );

        let err = store.teardown("WhiteBox Test Course", "test_whitebox").await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Unreachable { dependency: "database", attempts: 2, .. }
        ));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(5)]);
    }
}
