/// Route builders for the judge API
/// Every endpoint the harness calls is spelled out here once, so the client
/// and its tests never drift on paths.

pub const READYZ_PATH: &str = "/readyz";
pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGIN_PATH: &str = "/auth/login";
pub const ENROLLMENTS_PATH: &str = "/enrollments";

#[derive(Debug, Clone)]
pub struct ApiRoutes {
    base_url: String,
}

impl ApiRoutes {
    /// Trailing slashes on the base URL are dropped
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn readyz(&self) -> String {
        format!("{}{}", self.base_url, READYZ_PATH)
    }

    pub fn register(&self) -> String {
        format!("{}{}", self.base_url, REGISTER_PATH)
    }

    pub fn login(&self) -> String {
        format!("{}{}", self.base_url, LOGIN_PATH)
    }

    pub fn enrollments(&self) -> String {
        format!("{}{}", self.base_url, ENROLLMENTS_PATH)
    }

    pub fn submit(&self, course_id: i64, problem_id: i64) -> String {
        format!(
            "{}/courses/{}/problems/{}/submit",
            self.base_url, course_id, problem_id
        )
    }

    pub fn attempt(&self, attempt_id: i64) -> String {
        format!("{}/attempts/{}", self.base_url, attempt_id)
    }
}
