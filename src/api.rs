//! REST surface of the test harness.
//!
//! The orchestrator and polling fallback consume this surface through the
//! [`HarnessApi`] trait so they can run against in-memory doubles in tests;
//! [`HttpApi`] is the deployed implementation.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::registry::{RunOutcome, TestCase, TestConfig, TestDraft};
use crate::system::{SessionInfo, SystemMetrics};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// The harness endpoints the monitor consumes.
#[async_trait]
pub trait HarnessApi: Send + Sync {
    /// `GET /api/tests`
    async fn list_tests(&self) -> Result<Vec<TestCase>, ApiError>;

    /// `POST /api/tests`; the harness assigns the id.
    async fn create_test(&self, draft: &TestDraft) -> Result<TestCase, ApiError>;

    /// `POST /api/tests/{id}/run` with the test's config as the body.
    async fn run_test(&self, id: &str, config: &TestConfig) -> Result<RunOutcome, ApiError>;

    /// `GET /api/system/metrics`
    async fn system_metrics(&self) -> Result<SystemMetrics, ApiError>;

    /// `GET /api/sessions`
    async fn sessions(&self) -> Result<Vec<SessionInfo>, ApiError>;
}

/// reqwest-backed client against the harness origin.
pub struct HttpApi {
    client: reqwest::Client,
    base: String,
}

impl HttpApi {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.client.get(self.url(path)).send().await?;
        Ok(checked(response).await?.json().await?)
    }
}

/// Turn non-2xx responses into `ApiError::Status` with the body attached.
async fn checked(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}

#[async_trait]
impl HarnessApi for HttpApi {
    async fn list_tests(&self) -> Result<Vec<TestCase>, ApiError> {
        self.get_json("/api/tests").await
    }

    async fn create_test(&self, draft: &TestDraft) -> Result<TestCase, ApiError> {
        let response = self
            .client
            .post(self.url("/api/tests"))
            .json(draft)
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    async fn run_test(&self, id: &str, config: &TestConfig) -> Result<RunOutcome, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/api/tests/{id}/run")))
            .json(config)
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    async fn system_metrics(&self) -> Result<SystemMetrics, ApiError> {
        self.get_json("/api/system/metrics").await
    }

    async fn sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        self.get_json("/api/sessions").await
    }
}
