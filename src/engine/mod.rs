//! Remote collaborators: computation engines, the report service and the
//! network builder.
//!
//! Each computation type is served by one [`ComputationEngine`] registered in
//! an [`EngineRegistry`]. The orchestrator and the invalidation cascade only
//! ever talk to engines through this trait, so tests plug in-process fakes in
//! place of the REST clients.

pub mod builder;
pub mod report;
pub mod rest;

pub use builder::{BuildRequest, NetworkBuilder, RestNetworkBuilder};
pub use report::{ReportService, RestReportService};
pub use rest::RestComputationEngine;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{Config, HttpConfig};
use crate::domain::{ComputationType, NodeId};
use crate::error::{StudyError, StudyResult};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("remote call timed out")]
    Timeout,

    #[error("{0} not found on remote service")]
    NotFound(String),

    #[error("remote service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("no engine configured for {0}")]
    Unavailable(ComputationType),
}

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            EngineError::Timeout
        } else if error.is_decode() {
            EngineError::Decode(error.to_string())
        } else {
            EngineError::Transport(error.to_string())
        }
    }
}

/// Everything an engine needs to start a computation
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub network_ref: Uuid,
    pub variant_id: String,
    /// URL-encoded receiver token, echoed back in completion events
    pub receiver: String,
    pub report_id: Uuid,
    pub reporter_id: NodeId,
    pub user_id: String,
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunAccepted {
    pub result_id: Uuid,
    /// Synchronous engines finish the computation within the run call
    pub completed: bool,
}

/// Extra query parameters forwarded untouched to result endpoints
pub type ResultQuery = BTreeMap<String, String>;

#[async_trait]
pub trait ComputationEngine: Send + Sync {
    fn computation_type(&self) -> ComputationType;

    async fn run(&self, request: &RunRequest) -> Result<RunAccepted, EngineError>;

    async fn stop(&self, result_id: Uuid, receiver: &str) -> Result<(), EngineError>;

    async fn status(&self, result_id: Uuid) -> Result<Option<String>, EngineError>;

    async fn result(&self, result_id: Uuid, query: &ResultQuery) -> Result<Option<Value>, EngineError>;

    async fn delete_results(&self, result_ids: &[Uuid]) -> Result<(), EngineError>;
}

#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: HashMap<ComputationType, Arc<dyn ComputationEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, engine: Arc<dyn ComputationEngine>) {
        self.engines.insert(engine.computation_type(), engine);
    }

    pub fn with(mut self, engine: Arc<dyn ComputationEngine>) -> Self {
        self.register(engine);
        self
    }

    pub fn get(&self, computation: ComputationType) -> StudyResult<Arc<dyn ComputationEngine>> {
        self.engines
            .get(&computation)
            .cloned()
            .ok_or(StudyError::Upstream(EngineError::Unavailable(computation)))
    }

    /// One REST client per configured engine, sharing a connection pool
    pub fn from_config(cfg: &Config, client: &reqwest::Client) -> Self {
        let mut registry = Self::new();
        for computation in ComputationType::all() {
            if let Some(endpoint) = cfg.engine(computation) {
                registry.register(Arc::new(RestComputationEngine::new(
                    computation,
                    endpoint,
                    client.clone(),
                )));
            }
        }
        registry
    }
}

pub fn http_client(cfg: &HttpConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("grid-study/0.1"));
    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .default_headers(headers)
        .build()
        .context("failed to build HTTP client")
}

/// Maps 404 to [`EngineError::NotFound`] and other failures to
/// [`EngineError::Status`] with the response body.
pub(crate) async fn checked(
    response: reqwest::Response,
    what: impl std::fmt::Display,
) -> Result<reqwest::Response, EngineError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(EngineError::NotFound(what.to_string()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EngineError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
