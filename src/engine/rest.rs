use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{checked, ComputationEngine, EngineError, ResultQuery, RunAccepted, RunRequest};
use crate::config::EngineEndpoint;
use crate::domain::ComputationType;

/// REST client for one remote computation server
#[derive(Clone)]
pub struct RestComputationEngine {
    computation: ComputationType,
    base_url: String,
    api_version: String,
    synchronous: bool,
    client: reqwest::Client,
}

impl RestComputationEngine {
    pub fn new(computation: ComputationType, endpoint: &EngineEndpoint, client: reqwest::Client) -> Self {
        Self {
            computation,
            base_url: endpoint.base_url.clone(),
            api_version: endpoint.api_version.clone(),
            synchronous: endpoint.synchronous,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            path
        )
    }
}

#[async_trait]
impl ComputationEngine for RestComputationEngine {
    fn computation_type(&self) -> ComputationType {
        self.computation
    }

    async fn run(&self, request: &RunRequest) -> Result<RunAccepted, EngineError> {
        let url = self.url(&format!("networks/{}/run-and-save", request.network_ref));
        let report_id = request.report_id.to_string();
        let reporter_id = request.reporter_id.to_string();
        let mut builder = self
            .client
            .post(url)
            .header("userId", &request.user_id)
            .query(&[
                ("receiver", request.receiver.as_str()),
                ("reportUuid", report_id.as_str()),
                ("reporterId", reporter_id.as_str()),
                ("variantId", request.variant_id.as_str()),
            ]);
        if let Some(parameters) = &request.parameters {
            builder = builder.json(parameters);
        }
        let response = checked(builder.send().await?, format!("network {}", request.network_ref)).await?;
        let result_id: Uuid = response.json().await?;
        debug!(computation = %self.computation, %result_id, "run accepted");
        Ok(RunAccepted {
            result_id,
            completed: self.synchronous,
        })
    }

    async fn stop(&self, result_id: Uuid, receiver: &str) -> Result<(), EngineError> {
        let response = self
            .client
            .put(self.url(&format!("results/{}/stop", result_id)))
            .query(&[("receiver", receiver)])
            .send()
            .await?;
        checked(response, format!("result {}", result_id)).await?;
        Ok(())
    }

    async fn status(&self, result_id: Uuid) -> Result<Option<String>, EngineError> {
        let response = self
            .client
            .get(self.url(&format!("results/{}/status", result_id)))
            .send()
            .await?;
        let response = checked(response, format!("result {}", result_id)).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text().await?;
        let status = serde_json::from_str::<String>(&body).unwrap_or_else(|_| body.trim().to_string());
        Ok((!status.is_empty()).then_some(status))
    }

    async fn result(&self, result_id: Uuid, query: &ResultQuery) -> Result<Option<Value>, EngineError> {
        let response = self
            .client
            .get(self.url(&format!("results/{}", result_id)))
            .query(query)
            .send()
            .await?;
        let response = checked(response, format!("result {}", result_id)).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(response.json().await?))
    }

    async fn delete_results(&self, result_ids: &[Uuid]) -> Result<(), EngineError> {
        if result_ids.is_empty() {
            return Ok(());
        }
        let query: Vec<(&str, String)> = result_ids
            .iter()
            .map(|id| ("resultsUuids", id.to_string()))
            .collect();
        let response = self
            .client
            .delete(self.url("results"))
            .query(&query)
            .send()
            .await?;
        checked(response, "results").await?;
        Ok(())
    }
}
