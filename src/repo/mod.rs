pub mod claims;
pub mod parameters;
pub mod root_networks;
pub mod tree;

pub use claims::{ClaimKey, RunClaim, RunClaims};
pub use parameters::ParameterStore;
pub use root_networks::{InfoKey, RootNetworkRegistry};
pub use tree::{Insertion, NodeMove, NodeRemoval, StudyTree, TreeStore};

use std::sync::Arc;

/// In-memory stores shared by the services
#[derive(Clone, Default)]
pub struct Repositories {
    pub tree: Arc<TreeStore>,
    pub root_networks: Arc<RootNetworkRegistry>,
    pub parameters: Arc<ParameterStore>,
    pub claims: Arc<RunClaims>,
}

impl Repositories {
    pub fn new() -> Self {
        Self::default()
    }
}
