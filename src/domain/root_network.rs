use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::computation::{ComputationRun, ComputationType};

pub type RootNetworkId = Uuid;

/// Variant id of the imported case in the network store
pub const INITIAL_VARIANT_ID: &str = "InitialState";

/// An alternative base network a study tree is evaluated against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RootNetwork {
    pub id: RootNetworkId,
    pub name: String,
    pub network_ref: Uuid,
    pub case_ref: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    #[default]
    NotBuilt,
    Building,
    Built,
    BuildFailed,
}

impl BuildStatus {
    pub fn is_built(self) -> bool {
        self == BuildStatus::Built
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::NotBuilt => write!(f, "NOT_BUILT"),
            BuildStatus::Building => write!(f, "BUILDING"),
            BuildStatus::Built => write!(f, "BUILT"),
            BuildStatus::BuildFailed => write!(f, "BUILD_FAILED"),
        }
    }
}

/// State of one tree node evaluated against one root network
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RootNetworkNodeInfo {
    pub variant_id: String,
    pub build_status: BuildStatus,
    pub computation_results: BTreeMap<ComputationType, ComputationRun>,
}

impl RootNetworkNodeInfo {
    /// Record for the tree root: its variant is the imported case itself
    pub fn for_root() -> Self {
        Self {
            variant_id: INITIAL_VARIANT_ID.to_string(),
            build_status: BuildStatus::Built,
            computation_results: BTreeMap::new(),
        }
    }

    pub fn for_modification_node() -> Self {
        Self {
            variant_id: Uuid::new_v4().to_string(),
            build_status: BuildStatus::NotBuilt,
            computation_results: BTreeMap::new(),
        }
    }

    pub fn result(&self, computation: ComputationType) -> Option<&ComputationRun> {
        self.computation_results.get(&computation)
    }

    /// Empties every result slot, returning what was held
    pub fn take_results(&mut self) -> Vec<(ComputationType, ComputationRun)> {
        std::mem::take(&mut self.computation_results)
            .into_iter()
            .collect()
    }
}
