//! UI notifications.
//!
//! Every state change visible to clients is published as a
//! [`StudyNotification`]. The in-process [`BroadcastPublisher`] fans them out
//! to any number of subscribers (the SSE endpoint, tests); a slow subscriber
//! only loses its own backlog.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ComputationType, NodeId, RootNetworkId, StudyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    ComputationStatus(ComputationType),
    ComputationResult(ComputationType),
    ComputationFailed(ComputationType),
    ComputationCancelFailed(ComputationType),
    ComputationDebug(ComputationType),
    ComputationParameters(ComputationType),
    BuildStatus,
    NodeCreated,
    NodesDeleted,
    NodeMoved,
    NodesStashed,
    NodesRestored,
    RootNetworksUpdated,
}

impl UpdateType {
    pub fn name(&self) -> String {
        match self {
            UpdateType::ComputationStatus(t) => format!("{}_status", t.descriptor().notification_prefix),
            UpdateType::ComputationResult(t) => format!("{}Result", t.descriptor().notification_prefix),
            UpdateType::ComputationFailed(t) => format!("{}_failed", t.descriptor().notification_prefix),
            UpdateType::ComputationCancelFailed(t) => {
                format!("{}_cancel_failed", t.descriptor().notification_prefix)
            }
            UpdateType::ComputationDebug(t) => format!("{}_debug", t.descriptor().notification_prefix),
            UpdateType::ComputationParameters(t) => {
                format!("{}_parameters", t.descriptor().notification_prefix)
            }
            UpdateType::BuildStatus => "nodeBuildStatusUpdated".to_string(),
            UpdateType::NodeCreated => "nodeCreated".to_string(),
            UpdateType::NodesDeleted => "nodeDeleted".to_string(),
            UpdateType::NodeMoved => "nodeMoved".to_string(),
            UpdateType::NodesStashed => "nodeStashed".to_string(),
            UpdateType::NodesRestored => "nodesRestored".to_string(),
            UpdateType::RootNetworksUpdated => "rootNetworksUpdated".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudyNotification {
    pub study_uuid: StudyId,
    pub node_uuid: Option<NodeId>,
    pub root_network_uuid: Option<RootNetworkId>,
    pub update: UpdateType,
    pub user_id: Option<String>,
    pub error: Option<String>,
    pub result_uuid: Option<Uuid>,
    pub nodes: Vec<NodeId>,
    pub timestamp: DateTime<Utc>,
}

impl StudyNotification {
    pub fn new(study_uuid: StudyId, update: UpdateType) -> Self {
        Self {
            study_uuid,
            node_uuid: None,
            root_network_uuid: None,
            update,
            user_id: None,
            error: None,
            result_uuid: None,
            nodes: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_node(
        study_uuid: StudyId,
        node_uuid: NodeId,
        root_network_uuid: RootNetworkId,
        update: UpdateType,
    ) -> Self {
        Self {
            node_uuid: Some(node_uuid),
            root_network_uuid: Some(root_network_uuid),
            ..Self::new(study_uuid, update)
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_result(mut self, result_uuid: Uuid) -> Self {
        self.result_uuid = Some(result_uuid);
        self
    }

    pub fn with_nodes(mut self, nodes: Vec<NodeId>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Header set carried on the `study.update` destination
    pub fn headers(&self) -> BTreeMap<&'static str, String> {
        let mut headers = BTreeMap::new();
        headers.insert("studyUuid", self.study_uuid.to_string());
        headers.insert("updateType", self.update.name());
        headers.insert(
            "timestamp",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        if let Some(node) = self.node_uuid {
            headers.insert("nodeUuid", node.to_string());
        }
        if let Some(rn) = self.root_network_uuid {
            headers.insert("rootNetworkUuid", rn.to_string());
        }
        if let Some(user) = &self.user_id {
            headers.insert("userId", user.clone());
        }
        if let Some(error) = &self.error {
            headers.insert("error", error.clone());
        }
        if let Some(result) = self.result_uuid {
            headers.insert("resultUuid", result.to_string());
        }
        if !self.nodes.is_empty() {
            let nodes: Vec<String> = self.nodes.iter().map(Uuid::to_string).collect();
            headers.insert("nodes", nodes.join(","));
        }
        headers
    }
}

pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: StudyNotification);
}

pub struct BroadcastPublisher {
    tx: broadcast::Sender<StudyNotification>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StudyNotification> {
        self.tx.subscribe()
    }
}

impl NotificationPublisher for BroadcastPublisher {
    fn publish(&self, notification: StudyNotification) {
        let update_type = notification.update.name();
        debug!(
            study_id = %notification.study_uuid,
            node_id = ?notification.node_uuid,
            update_type = %update_type,
            "publishing study notification"
        );
        if self.tx.send(notification).is_err() {
            debug!(update_type = %update_type, "no notification subscriber");
        }
    }
}
