// HTTP client for the judge API
// The harness only ever talks to the backend through `JudgeApi`; the reqwest
// implementation below is the production path, tests script the trait.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::debug;
use verdict_probe_common::api::ApiRoutes;
use verdict_probe_common::config::ApiConfig;
use verdict_probe_common::types::{
    AttemptView, EnrollRequest, LoginRequest, LoginResponse, RegisterRequest, SubmitRequest,
    SubmitResponse,
};

use crate::error::{HarnessError, Result};
use crate::readiness::ReadinessProbe;

/// A response the backend answered with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub body: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} {}", self.status, self.body.trim())
    }
}

#[derive(Debug, Clone)]
pub enum Reply<T> {
    Accepted(T),
    Rejected(Rejection),
}

#[async_trait]
pub trait JudgeApi: Send + Sync {
    /// Returns the HTTP status; the body is not inspected
    async fn register(&self, request: &RegisterRequest) -> Result<u16>;

    async fn login(&self, request: &LoginRequest) -> Result<Reply<LoginResponse>>;

    /// Returns the HTTP status; the body is not inspected
    async fn enroll(&self, token: &str, request: &EnrollRequest) -> Result<u16>;

    async fn submit(
        &self,
        token: &str,
        course_id: i64,
        problem_id: i64,
        request: &SubmitRequest,
    ) -> Result<Reply<SubmitResponse>>;

    async fn attempt(&self, token: &str, attempt_id: i64) -> Result<AttemptView>;
}

pub struct HttpJudgeApi {
    client: Client,
    routes: ApiRoutes,
    probe_timeout: std::time::Duration,
}

impl HttpJudgeApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| HarnessError::transport(&config.base_url, e))?;

        Ok(Self {
            client,
            routes: ApiRoutes::new(&config.base_url),
            probe_timeout: config.probe_timeout,
        })
    }

    pub fn routes(&self) -> &ApiRoutes {
        &self.routes
    }
}

/// Decode a JSON body, reporting shape mismatches as protocol errors
async fn read_json<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| HarnessError::transport(endpoint, e))?;

    serde_json::from_str(&body).map_err(|e| HarnessError::Protocol {
        endpoint: endpoint.to_string(),
        reason: format!("{}: {}", e, body),
    })
}

async fn rejection(endpoint: &str, response: Response) -> Result<Rejection> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| HarnessError::transport(endpoint, e))?;
    Ok(Rejection { status, body })
}

#[async_trait]
impl JudgeApi for HttpJudgeApi {
    async fn register(&self, request: &RegisterRequest) -> Result<u16> {
        let url = self.routes.register();
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| HarnessError::transport(&url, e))?;

        Ok(response.status().as_u16())
    }

    async fn login(&self, request: &LoginRequest) -> Result<Reply<LoginResponse>> {
        let url = self.routes.login();
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| HarnessError::transport(&url, e))?;

        if response.status() != StatusCode::OK {
            return Ok(Reply::Rejected(rejection(&url, response).await?));
        }
        Ok(Reply::Accepted(read_json(&url, response).await?))
    }

    async fn enroll(&self, token: &str, request: &EnrollRequest) -> Result<u16> {
        let url = self.routes.enrollments();
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| HarnessError::transport(&url, e))?;

        Ok(response.status().as_u16())
    }

    async fn submit(
        &self,
        token: &str,
        course_id: i64,
        problem_id: i64,
        request: &SubmitRequest,
    ) -> Result<Reply<SubmitResponse>> {
        let url = self.routes.submit(course_id, problem_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| HarnessError::transport(&url, e))?;

        if response.status() != StatusCode::OK {
            return Ok(Reply::Rejected(rejection(&url, response).await?));
        }
        Ok(Reply::Accepted(read_json(&url, response).await?))
    }

    async fn attempt(&self, token: &str, attempt_id: i64) -> Result<AttemptView> {
        let url = self.routes.attempt(attempt_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| HarnessError::transport(&url, e))?;

        if !response.status().is_success() {
            let rejected = rejection(&url, response).await?;
            return Err(HarnessError::Protocol {
                endpoint: url,
                reason: rejected.to_string(),
            });
        }
        read_json(&url, response).await
    }
}

#[async_trait]
impl ReadinessProbe for HttpJudgeApi {
    fn dependency(&self) -> &'static str {
        "api"
    }

    /// Any response counts, whatever its status
    async fn check(&self) -> anyhow::Result<()> {
        let url = self.routes.readyz();
        let response = self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await?;
        debug!(url = %url, status = response.status().as_u16(), "Liveness probe answered");
        Ok(())
    }
}
