use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::{checked, EngineError};

/// Applies the modifications of a node lineage onto a fresh variant
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    #[serde(skip)]
    pub network_ref: Uuid,
    #[serde(skip)]
    pub receiver: String,
    pub origin_variant_id: String,
    pub destination_variant_id: String,
    /// Modification groups from the first node after the origin down to the target
    pub modification_group_uuids: Vec<Uuid>,
    pub report_uuid: Uuid,
}

#[async_trait]
pub trait NetworkBuilder: Send + Sync {
    async fn build(&self, request: &BuildRequest) -> Result<(), EngineError>;

    async fn stop_build(&self, receiver: &str) -> Result<(), EngineError>;
}

#[derive(Clone)]
pub struct RestNetworkBuilder {
    base_url: String,
    client: reqwest::Client,
}

impl RestNetworkBuilder {
    pub fn new(base_url: String, client: reqwest::Client) -> Self {
        Self { base_url, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl NetworkBuilder for RestNetworkBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<(), EngineError> {
        let response = self
            .client
            .post(self.url(&format!("networks/{}/build", request.network_ref)))
            .query(&[("receiver", request.receiver.as_str())])
            .json(request)
            .send()
            .await?;
        checked(response, format!("network {}", request.network_ref)).await?;
        Ok(())
    }

    async fn stop_build(&self, receiver: &str) -> Result<(), EngineError> {
        let response = self
            .client
            .put(self.url("build/stop"))
            .query(&[("receiver", receiver)])
            .send()
            .await?;
        checked(response, "build").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn build_posts_lineage_groups() {
        let server = MockServer::start().await;
        let group = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1/networks/[0-9a-f-]+/build$"))
            .and(body_partial_json(serde_json::json!({
                "originVariantId": "InitialState",
                "modificationGroupUuids": [group],
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let builder = RestNetworkBuilder::new(server.uri(), reqwest::Client::new());
        builder
            .build(&BuildRequest {
                network_ref: Uuid::new_v4(),
                receiver: "r".to_string(),
                origin_variant_id: "InitialState".to_string(),
                destination_variant_id: "v2".to_string(),
                modification_group_uuids: vec![group],
                report_uuid: Uuid::new_v4(),
            })
            .await
            .unwrap();
    }
}
