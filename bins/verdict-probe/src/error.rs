use thiserror::Error;

/// Failures that abort the run. Scenario-level failures are not errors; they
/// are recorded by the reporter and the run continues.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// A dependency stayed down for the whole readiness budget.
    #[error("{dependency} unreachable after {attempts} attempts: {last_error}")]
    Unreachable {
        dependency: &'static str,
        attempts: u32,
        last_error: String,
    },

    /// Login did not return 200.
    #[error("login as '{login}' rejected with HTTP {status}: {body}")]
    Authentication {
        login: String,
        status: u16,
        body: String,
    },

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// A success response whose body did not have the expected shape.
    #[error("unexpected response from {endpoint}: {reason}")]
    Protocol { endpoint: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Nothing to run with the given settings.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("interrupted before the run finished")]
    Interrupted,
}

impl HarnessError {
    pub fn transport(endpoint: &str, source: reqwest::Error) -> Self {
        HarnessError::Transport {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
