use serde::{Deserialize, Serialize};

use super::node::NodeId;
use super::root_network::RootNetworkId;

/// Correlation token handed to remote engines and echoed back in every
/// asynchronous completion event.
///
/// On the wire it is a URL-encoded JSON object
/// `{"nodeUuid": .., "rootNetworkUuid": .., "userId": ..}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverToken {
    pub node_uuid: NodeId,
    pub root_network_uuid: RootNetworkId,
    pub user_id: String,
}

impl ReceiverToken {
    pub fn new(node_uuid: NodeId, root_network_uuid: RootNetworkId, user_id: impl Into<String>) -> Self {
        Self {
            node_uuid,
            root_network_uuid,
            user_id: user_id.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(urlencoding::encode(&json).into_owned())
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let json = urlencoding::decode(raw).ok()?;
        serde_json::from_str(&json).ok()
    }
}
