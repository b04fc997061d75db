use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal classification the judge assigns to an attempt.
///
/// Codes are the strings the judge reports in the attempt's `status` field.
/// Anything outside the known taxonomy (sandbox internals such as `SG` or
/// `XX`) is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    CompileError,
    RuntimeError,
    MemoryLimitExceeded,
    TimeLimitExceeded,
    Other(String),
}

impl Verdict {
    pub fn from_code(code: &str) -> Self {
        match code {
            "AC" => Verdict::Accepted,
            "WA" => Verdict::WrongAnswer,
            "CE" => Verdict::CompileError,
            "RE" => Verdict::RuntimeError,
            "MLE" => Verdict::MemoryLimitExceeded,
            "TO" => Verdict::TimeLimitExceeded,
            other => Verdict::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::CompileError => "CE",
            Verdict::RuntimeError => "RE",
            Verdict::MemoryLimitExceeded => "MLE",
            Verdict::TimeLimitExceeded => "TO",
            Verdict::Other(code) => code,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Status of an attempt as reported by `GET /attempts/{id}`.
///
/// Starts as `Pending` and moves exactly once to a terminal verdict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttemptStatus {
    Pending,
    Terminal(Verdict),
}

pub const PENDING: &str = "pending";

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Terminal(_))
    }
}

impl From<String> for AttemptStatus {
    fn from(raw: String) -> Self {
        if raw == PENDING {
            AttemptStatus::Pending
        } else {
            AttemptStatus::Terminal(Verdict::from_code(&raw))
        }
    }
}

impl From<AttemptStatus> for String {
    fn from(status: AttemptStatus) -> Self {
        status.to_string()
    }
}

impl From<Verdict> for AttemptStatus {
    fn from(verdict: Verdict) -> Self {
        AttemptStatus::Terminal(verdict)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::Pending => f.write_str(PENDING),
            AttemptStatus::Terminal(verdict) => verdict.fmt(f),
        }
    }
}

/// The set of statuses a scenario accepts as a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedStatuses(Vec<AttemptStatus>);

impl ExpectedStatuses {
    pub fn one(verdict: Verdict) -> Self {
        Self(vec![verdict.into()])
    }

    pub fn any_of(verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        Self(verdicts.into_iter().map(AttemptStatus::from).collect())
    }

    pub fn admits(&self, observed: &AttemptStatus) -> bool {
        self.0.contains(observed)
    }

    pub fn statuses(&self) -> &[AttemptStatus] {
        &self.0
    }
}

impl fmt::Display for ExpectedStatuses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", codes.join(", "))
    }
}

/// One row of the scenario table: a candidate solution body and the
/// statuses it must produce. Helper routines are not part of `code`.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub code: String,
    pub expected: ExpectedStatuses,
}

impl Scenario {
    pub fn new(name: &str, code: &str, expected: ExpectedStatuses) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
            expected,
        }
    }
}

// Fixture content stored alongside the problem

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// Structured metadata attached to a reference-solution template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub function_name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseSpec {
    pub input: serde_json::Value,
    pub output: serde_json::Value,
}

// Wire types for the judge HTTP API

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub login: String,
    pub password: String,
    pub repeated_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollRequest {
    pub course_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub attempt_id: i64,
}

/// The subset of the attempt resource the harness reads.
#[derive(Debug, Clone, Deserialize)]
pub struct AttemptView {
    pub status: AttemptStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}
