pub mod build;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::bus::MessageHub;
use crate::config::Config;
use crate::consumer::ResultConsumer;
use crate::domain::{
    InsertMode, Node, NodeId, RootNetwork, RootNetworkId, RootNetworkNodeInfo, StudyId,
    NodeSpec,
};
use crate::engine::{
    http_client, EngineRegistry, NetworkBuilder, ReportService, RestNetworkBuilder,
    RestReportService,
};
use crate::error::{StudyError, StudyResult};
use crate::invalidation::{InvalidationEngine, InvalidationSummary};
use crate::notification::{BroadcastPublisher, NotificationPublisher, StudyNotification, UpdateType};
use crate::orchestrator::ComputationOrchestrator;
use crate::repo::Repositories;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub repos: Repositories,
    pub studies: Arc<StudyController>,
    pub orchestrator: Arc<ComputationOrchestrator>,
    pub consumer: Arc<ResultConsumer>,
    pub hub: Arc<MessageHub>,
    pub notifications: Arc<BroadcastPublisher>,
}

impl AppState {
    pub fn new(cfg: Config) -> Result<Self> {
        let client = http_client(&cfg.http)?;
        let engines = EngineRegistry::from_config(&cfg, &client);
        let reports = Arc::new(RestReportService::new(cfg.report.base_url.clone(), client.clone()));
        let builder = Arc::new(RestNetworkBuilder::new(cfg.builder.base_url.clone(), client));
        Ok(Self::from_parts(cfg, Repositories::new(), engines, reports, builder))
    }

    /// Wires the services around the given collaborators
    pub fn from_parts(
        cfg: Config,
        repos: Repositories,
        engines: EngineRegistry,
        reports: Arc<dyn ReportService>,
        builder: Arc<dyn NetworkBuilder>,
    ) -> Self {
        let notifications = Arc::new(BroadcastPublisher::new(cfg.bus.notification_capacity));
        let notifier: Arc<dyn NotificationPublisher> = notifications.clone();
        let invalidation = Arc::new(InvalidationEngine::new(
            repos.clone(),
            engines.clone(),
            Arc::clone(&reports),
            Arc::clone(&notifier),
        ));
        let studies = Arc::new(StudyController::new(
            repos.clone(),
            invalidation,
            builder,
            Arc::clone(&notifier),
        ));
        let orchestrator = Arc::new(ComputationOrchestrator::new(
            repos.clone(),
            engines,
            reports,
            Arc::clone(&notifier),
        ));
        let consumer = Arc::new(ResultConsumer::new(repos.clone(), notifier));
        let hub = Arc::new(MessageHub::new(cfg.bus.channel_capacity));
        Self {
            cfg,
            repos,
            studies,
            orchestrator,
            consumer,
            hub,
            notifications,
        }
    }
}

/// One consumer task per inbound bus destination
pub fn spawn_consumer_tasks(state: &AppState) -> Vec<JoinHandle<()>> {
    let handles = state.consumer.spawn(&state.hub);
    info!(destinations = handles.len(), "bus consumers started");
    handles
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRootNetwork {
    #[serde(default = "default_root_network_name")]
    pub name: String,
    pub network_uuid: Uuid,
    pub case_uuid: Uuid,
}

fn default_root_network_name() -> String {
    "base".to_string()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyCreated {
    pub study_uuid: StudyId,
    pub root_node: Node,
    pub root_network: RootNetwork,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModificationChangeKind {
    Insert,
    Update,
    Delete,
    Move,
    Copy,
}

/// Notice that the modifications of a node changed
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationChange {
    pub kind: ModificationChangeKind,
    pub origin_node_uuid: Option<NodeId>,
    pub target_node_uuid: NodeId,
}

pub struct StudyController {
    repos: Repositories,
    invalidation: Arc<InvalidationEngine>,
    builder: Arc<dyn NetworkBuilder>,
    notifier: Arc<dyn NotificationPublisher>,
}

impl StudyController {
    pub fn new(
        repos: Repositories,
        invalidation: Arc<InvalidationEngine>,
        builder: Arc<dyn NetworkBuilder>,
        notifier: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            repos,
            invalidation,
            builder,
            notifier,
        }
    }

    pub fn create_study(&self, root_network: NewRootNetwork) -> StudyResult<StudyCreated> {
        let study_uuid = Uuid::new_v4();
        let root_node = self.repos.tree.create_root(study_uuid)?;
        let root_network = RootNetwork {
            id: Uuid::new_v4(),
            name: root_network.name,
            network_ref: root_network.network_uuid,
            case_ref: root_network.case_uuid,
        };
        self.repos
            .root_networks
            .add_root_network(study_uuid, root_network.clone());
        self.repos
            .root_networks
            .create(root_node.id, root_network.id, RootNetworkNodeInfo::for_root());
        info!(study_id = %study_uuid, root_network_id = %root_network.id, "study created");
        Ok(StudyCreated {
            study_uuid,
            root_node,
            root_network,
        })
    }

    pub fn tree(&self, study_id: StudyId) -> StudyResult<Vec<Node>> {
        self.repos.tree.nodes(study_id)
    }

    pub fn root_networks(&self, study_id: StudyId) -> StudyResult<Vec<RootNetwork>> {
        self.repos.tree.root(study_id)?;
        Ok(self.repos.root_networks.root_networks(study_id))
    }

    /// Attaches a root network and gives every existing node a record for it
    pub fn add_root_network(&self, study_id: StudyId, new: NewRootNetwork) -> StudyResult<RootNetwork> {
        let root_network = RootNetwork {
            id: Uuid::new_v4(),
            name: new.name,
            network_ref: new.network_uuid,
            case_ref: new.case_uuid,
        };
        // Node inserts take the same lock, so none can miss the new root network
        let nodes = self.repos.tree.exclusive(study_id, |tree| {
            let nodes = tree.subtree(tree.root_id())?;
            self.repos
                .root_networks
                .add_root_network(study_id, root_network.clone());
            for id in &nodes {
                let info = if *id == tree.root_id() {
                    RootNetworkNodeInfo::for_root()
                } else {
                    RootNetworkNodeInfo::for_modification_node()
                };
                self.repos.root_networks.create(*id, root_network.id, info);
            }
            Ok(nodes.len())
        })?;
        info!(study_id = %study_id, root_network_id = %root_network.id, nodes, "root network added");
        self.notifier
            .publish(StudyNotification::new(study_id, UpdateType::RootNetworksUpdated));
        Ok(root_network)
    }

    pub fn remove_root_network(&self, study_id: StudyId, root_network_id: RootNetworkId) -> StudyResult<()> {
        let removed = self.repos.tree.exclusive(study_id, |_| {
            self.repos.root_networks.root_network(study_id, root_network_id)?;
            if self.repos.root_networks.root_networks(study_id).len() <= 1 {
                return Err(StudyError::forbidden(
                    "LAST_ROOT_NETWORK",
                    "a study keeps at least one root network",
                ));
            }
            self.repos
                .root_networks
                .remove_root_network(study_id, root_network_id)
        })?;
        info!(study_id = %study_id, root_network_id = %root_network_id, records = removed.len(), "root network removed");
        self.invalidation
            .discard_records(removed.into_iter().map(|(_, info)| info));
        self.notifier
            .publish(StudyNotification::new(study_id, UpdateType::RootNetworksUpdated));
        Ok(())
    }

    pub fn insert_node(
        &self,
        study_id: StudyId,
        reference: NodeId,
        mode: InsertMode,
        spec: NodeSpec,
        user_id: Option<&str>,
    ) -> StudyResult<Node> {
        let (insertion, ()) = self
            .repos
            .tree
            .insert_with(study_id, reference, mode, spec, |insertion| {
                for rn in self.repos.root_networks.root_networks(study_id) {
                    self.repos.root_networks.create(
                        insertion.node.id,
                        rn.id,
                        RootNetworkNodeInfo::for_modification_node(),
                    );
                }
            })?;
        self.invalidation.invalidate(study_id, &insertion.displaced, None)?;
        info!(study_id = %study_id, node_id = %insertion.node.id, ?mode, "node created");
        self.publish_nodes(study_id, UpdateType::NodeCreated, vec![insertion.node.id], user_id);
        Ok(insertion.node)
    }

    /// Deletes a node, with its descendants or re-attaching them to its parent
    pub fn delete_node(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        delete_children: bool,
        user_id: Option<&str>,
    ) -> StudyResult<Vec<NodeId>> {
        let (removed, reattached) = if delete_children {
            let removed: Vec<NodeId> = self
                .repos
                .tree
                .delete_subtree(study_id, node_id)?
                .into_iter()
                .map(|node| node.id)
                .collect();
            (removed, Vec::new())
        } else {
            let removal = self.repos.tree.delete_node(study_id, node_id)?;
            (vec![removal.removed.id], removal.reattached)
        };
        for id in &removed {
            let records = self.repos.root_networks.remove_node(*id);
            self.invalidation
                .discard_records(records.into_iter().map(|(_, info)| info));
        }
        self.invalidation.invalidate(study_id, &reattached, None)?;
        info!(study_id = %study_id, node_id = %node_id, removed = removed.len(), "nodes deleted");
        self.publish_nodes(study_id, UpdateType::NodesDeleted, removed.clone(), user_id);
        Ok(removed)
    }

    /// With `subtree`, moves the node and its descendants under `reference`;
    /// otherwise moves the node alone relative to `reference`.
    pub fn move_node(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        reference: NodeId,
        mode: InsertMode,
        subtree: bool,
        user_id: Option<&str>,
    ) -> StudyResult<InvalidationSummary> {
        let affected = if subtree {
            self.repos.tree.move_subtree(study_id, node_id, reference)?;
            vec![node_id]
        } else {
            let moved = self.repos.tree.move_node(study_id, node_id, reference, mode)?;
            let mut affected = moved.reattached;
            affected.push(node_id);
            affected.extend(moved.displaced);
            affected
        };
        let summary = self.invalidation.invalidate(study_id, &affected, None)?;
        info!(study_id = %study_id, node_id = %node_id, reference = %reference, subtree, "node moved");
        self.publish_nodes(study_id, UpdateType::NodeMoved, vec![node_id], user_id);
        Ok(summary)
    }

    /// Stashed nodes keep their place but lose their variants and results
    pub fn stash(&self, study_id: StudyId, node_id: NodeId, user_id: Option<&str>) -> StudyResult<Vec<NodeId>> {
        if self.repos.tree.node(study_id, node_id)?.is_root() {
            return Err(StudyError::forbidden("CANNOT_STASH_ROOT", "the root node cannot be stashed"));
        }
        self.invalidation.invalidate(study_id, &[node_id], None)?;
        let stashed = self.repos.tree.stash(study_id, node_id)?;
        info!(study_id = %study_id, node_id = %node_id, count = stashed.len(), "nodes stashed");
        self.publish_nodes(study_id, UpdateType::NodesStashed, stashed.clone(), user_id);
        Ok(stashed)
    }

    pub fn restore(&self, study_id: StudyId, node_id: NodeId, user_id: Option<&str>) -> StudyResult<Vec<NodeId>> {
        let restored = self.repos.tree.restore(study_id, node_id)?;
        info!(study_id = %study_id, node_id = %node_id, count = restored.len(), "nodes restored");
        self.publish_nodes(study_id, UpdateType::NodesRestored, restored.clone(), user_id);
        Ok(restored)
    }

    /// Invalidates what a modification change made stale. A move touches both
    /// its origin and its target; everything else only the target.
    pub fn modifications_changed(
        &self,
        study_id: StudyId,
        change: &ModificationChange,
    ) -> StudyResult<InvalidationSummary> {
        let affected: Vec<NodeId> = match (change.kind, change.origin_node_uuid) {
            (ModificationChangeKind::Move, Some(origin)) => self
                .repos
                .tree
                .highest_nodes(study_id, origin, change.target_node_uuid)?
                .into_iter()
                .map(|node| node.id)
                .collect(),
            _ => vec![change.target_node_uuid],
        };
        let summary = self.invalidation.invalidate(study_id, &affected, None)?;
        info!(
            study_id = %study_id,
            kind = ?change.kind,
            target = %change.target_node_uuid,
            invalidated = summary.invalidated_nodes,
            "modifications changed"
        );
        Ok(summary)
    }

    fn publish_nodes(&self, study_id: StudyId, update: UpdateType, nodes: Vec<NodeId>, user_id: Option<&str>) {
        let mut notification = StudyNotification::new(study_id, update).with_nodes(nodes);
        if let Some(user) = user_id {
            notification = notification.with_user(user);
        }
        self.notifier.publish(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildStatus, ComputationRun, ComputationType, NodeSubtype};
    use crate::engine::{BuildRequest, EngineError};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl ReportService for Noop {
        async fn delete_reports(&self, _ids: &[Uuid]) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[async_trait]
    impl NetworkBuilder for Noop {
        async fn build(&self, _request: &BuildRequest) -> Result<(), EngineError> {
            Ok(())
        }

        async fn stop_build(&self, _receiver: &str) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn state() -> AppState {
        AppState::from_parts(
            Config::default(),
            Repositories::new(),
            EngineRegistry::new(),
            Arc::new(Noop),
            Arc::new(Noop),
        )
    }

    fn new_rn() -> NewRootNetwork {
        NewRootNetwork {
            name: "base".into(),
            network_uuid: Uuid::new_v4(),
            case_uuid: Uuid::new_v4(),
        }
    }

    fn spec(name: &str) -> NodeSpec {
        NodeSpec::named(name, NodeSubtype::Construction)
    }

    #[test]
    fn new_nodes_get_a_record_per_root_network() {
        let st = state();
        let created = st.studies.create_study(new_rn()).unwrap();
        let second = st.studies.add_root_network(created.study_uuid, new_rn()).unwrap();
        let node = st
            .studies
            .insert_node(created.study_uuid, created.root_node.id, InsertMode::Child, spec("n1"), None)
            .unwrap();
        for rn in [created.root_network.id, second.id] {
            assert_eq!(
                st.repos.root_networks.get(node.id, rn).unwrap().build_status,
                BuildStatus::NotBuilt
            );
            assert!(st
                .repos
                .root_networks
                .get(created.root_node.id, rn)
                .unwrap()
                .build_status
                .is_built());
        }
    }

    #[test]
    fn subtree_deletion_drops_every_record() {
        let st = state();
        let created = st.studies.create_study(new_rn()).unwrap();
        let study = created.study_uuid;
        let second = st.studies.add_root_network(study, new_rn()).unwrap();
        let n1 = st
            .studies
            .insert_node(study, created.root_node.id, InsertMode::Child, spec("n1"), None)
            .unwrap();
        let n2 = st.studies.insert_node(study, n1.id, InsertMode::Child, spec("n2"), None).unwrap();
        let removed = st.studies.delete_node(study, n1.id, true, Some("u")).unwrap();
        assert_eq!(removed.len(), 2);
        for id in [n1.id, n2.id] {
            for rn in [created.root_network.id, second.id] {
                assert!(!st.repos.root_networks.contains(id, rn));
            }
        }
    }

    #[test]
    fn inserting_before_invalidates_the_reference_subtree() {
        let st = state();
        let created = st.studies.create_study(new_rn()).unwrap();
        let study = created.study_uuid;
        let rn = created.root_network.id;
        let n1 = st
            .studies
            .insert_node(study, created.root_node.id, InsertMode::Child, spec("n1"), None)
            .unwrap();
        st.repos.root_networks.update_build_status(n1.id, rn, BuildStatus::Built).unwrap();
        st.repos
            .root_networks
            .set_computation_result(
                n1.id,
                rn,
                ComputationType::LoadFlow,
                Some(ComputationRun::running(Uuid::new_v4(), Uuid::new_v4())),
            )
            .unwrap();
        st.studies
            .insert_node(study, n1.id, InsertMode::Before, spec("n0"), None)
            .unwrap();
        let info = st.repos.root_networks.get(n1.id, rn).unwrap();
        assert_eq!(info.build_status, BuildStatus::NotBuilt);
        assert!(info.computation_results.is_empty());
    }

    #[test]
    fn last_root_network_cannot_be_removed() {
        let st = state();
        let created = st.studies.create_study(new_rn()).unwrap();
        let err = st
            .studies
            .remove_root_network(created.study_uuid, created.root_network.id)
            .unwrap_err();
        assert_eq!(err.code(), "LAST_ROOT_NETWORK");
    }

    #[test]
    fn modification_move_invalidates_both_ends() {
        let st = state();
        let created = st.studies.create_study(new_rn()).unwrap();
        let study = created.study_uuid;
        let root = created.root_node.id;
        let a = st.studies.insert_node(study, root, InsertMode::Child, spec("a"), None).unwrap();
        let b = st.studies.insert_node(study, root, InsertMode::Child, spec("b"), None).unwrap();
        let summary = st
            .studies
            .modifications_changed(
                study,
                &ModificationChange {
                    kind: ModificationChangeKind::Move,
                    origin_node_uuid: Some(a.id),
                    target_node_uuid: b.id,
                },
            )
            .unwrap();
        assert_eq!(summary.covering, vec![a.id, b.id]);
    }
}
