use async_trait::async_trait;
use futures::future::join_all;
use uuid::Uuid;

use super::{checked, EngineError};

/// Shared reporting collaborator holding computation and build logs
#[async_trait]
pub trait ReportService: Send + Sync {
    async fn delete_reports(&self, report_ids: &[Uuid]) -> Result<(), EngineError>;
}

#[derive(Clone)]
pub struct RestReportService {
    base_url: String,
    client: reqwest::Client,
}

impl RestReportService {
    pub fn new(base_url: String, client: reqwest::Client) -> Self {
        Self { base_url, client }
    }

    async fn delete_report(&self, report_id: Uuid) -> Result<(), EngineError> {
        let url = format!("{}/v1/reports/{}", self.base_url.trim_end_matches('/'), report_id);
        match checked(self.client.delete(url).send().await?, format!("report {}", report_id)).await {
            Ok(_) | Err(EngineError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ReportService for RestReportService {
    async fn delete_reports(&self, report_ids: &[Uuid]) -> Result<(), EngineError> {
        let outcomes = join_all(report_ids.iter().map(|id| self.delete_report(*id))).await;
        outcomes.into_iter().collect()
    }
}
