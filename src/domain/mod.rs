pub mod computation;
pub mod node;
pub mod receiver;
pub mod root_network;

pub use computation::*;
pub use node::*;
pub use receiver::*;
pub use root_network::*;

use serde::{Deserialize, Serialize};

/// Addresses one (node, root network) pair inside a study
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct NodeContext {
    pub study_id: StudyId,
    pub node_id: NodeId,
    pub root_network_id: RootNetworkId,
}

impl NodeContext {
    pub fn new(study_id: StudyId, node_id: NodeId, root_network_id: RootNetworkId) -> Self {
        Self {
            study_id,
            node_id,
            root_network_id,
        }
    }
}
