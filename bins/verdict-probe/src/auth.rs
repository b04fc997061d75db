// Throwaway identity: register, log in, enroll in the fixture's course

use tracing::{debug, info, warn};
use verdict_probe_common::config::Identity;
use verdict_probe_common::types::{EnrollRequest, LoginRequest, RegisterRequest};

use crate::client::{JudgeApi, Reply};
use crate::error::{HarnessError, Result};
use crate::fixture::Fixture;

/// Bearer credential for one throwaway user. Lives for the run, never stored.
#[derive(Clone)]
pub struct Session {
    login: String,
    token: String,
}

impl Session {
    pub fn new(login: &str, token: &str) -> Self {
        Self {
            login: login.to_string(),
            token: token.to_string(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

/// Register the identity, exchange its credentials for a token, and enroll
/// it in the fixture's course so the backend accepts its submissions.
///
/// A registration that reports the user already exists (left over from an
/// interrupted run) is tolerated. A login that does not return 200 is fatal.
pub async fn register_and_login(
    api: &dyn JudgeApi,
    identity: &Identity,
    fixture: &Fixture,
) -> Result<Session> {
    let register_status = api
        .register(&RegisterRequest {
            login: identity.login.clone(),
            password: identity.password.clone(),
            repeated_password: identity.password.clone(),
        })
        .await?;
    debug!(login = %identity.login, status = register_status, "Registration answered");

    let login = LoginRequest {
        login: identity.login.clone(),
        password: identity.password.clone(),
    };
    let token = match api.login(&login).await? {
        Reply::Accepted(response) => response.access_token,
        Reply::Rejected(rejection) => {
            return Err(HarnessError::Authentication {
                login: identity.login.clone(),
                status: rejection.status,
                body: rejection.body,
            });
        }
    };
    info!(login = %identity.login, "Authenticated");

    let enroll_status = api
        .enroll(&token, &EnrollRequest { course_id: fixture.course_id })
        .await?;
    if (200..300).contains(&enroll_status) {
        debug!(course_id = fixture.course_id, "Enrolled");
    } else {
        warn!(
            course_id = fixture.course_id,
            status = enroll_status,
            "Enrollment not acknowledged; submissions may be rejected"
        );
    }

    Ok(Session::new(&identity.login, &token))
}
