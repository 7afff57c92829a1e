//! Invalidation cascade.
//!
//! A structural or modification change makes the variants of the changed nodes
//! and of everything below them stale. The directly affected nodes are first
//! reduced to the subtrees covering them, then every (node, root network) record
//! of those subtrees is reset: build status back to `NOT_BUILT` and every
//! result slot emptied. Results held by remote engines are deleted in the
//! background; a failure there only costs storage and is logged.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    BuildStatus, ComputationRun, ComputationType, NodeId, RootNetworkId, RootNetworkNodeInfo,
    StudyId,
};
use crate::engine::{EngineRegistry, ReportService};
use crate::error::StudyResult;
use crate::notification::{NotificationPublisher, StudyNotification, UpdateType};
use crate::repo::Repositories;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationSummary {
    /// Subtree roots the cascade started from
    pub covering: Vec<NodeId>,
    pub invalidated_nodes: usize,
    pub cleared_results: usize,
}

/// Remote artifacts left behind by cleared slots, grouped per engine
#[derive(Debug, Default)]
struct Leftovers {
    results: BTreeMap<ComputationType, Vec<Uuid>>,
    reports: Vec<Uuid>,
}

impl Leftovers {
    fn push(&mut self, computation: ComputationType, run: ComputationRun) {
        self.results.entry(computation).or_default().push(run.result_id);
        self.reports.extend(run.report_id);
    }

    fn is_empty(&self) -> bool {
        self.results.is_empty() && self.reports.is_empty()
    }
}

pub struct InvalidationEngine {
    repos: Repositories,
    engines: EngineRegistry,
    reports: Arc<dyn ReportService>,
    notifier: Arc<dyn NotificationPublisher>,
}

impl InvalidationEngine {
    pub fn new(
        repos: Repositories,
        engines: EngineRegistry,
        reports: Arc<dyn ReportService>,
        notifier: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            repos,
            engines,
            reports,
            notifier,
        }
    }

    /// Resets the subtrees of `affected` on the given root networks, or on all
    /// of the study's root networks when `root_networks` is `None`.
    pub fn invalidate(
        &self,
        study_id: StudyId,
        affected: &[NodeId],
        root_networks: Option<&[RootNetworkId]>,
    ) -> StudyResult<InvalidationSummary> {
        if affected.is_empty() {
            return Ok(InvalidationSummary::default());
        }
        let (covering, nodes, root_id) = self.repos.tree.read(study_id, |tree| {
            let covering = tree.covering_nodes(affected)?;
            let mut nodes = Vec::new();
            for id in &covering {
                nodes.extend(tree.subtree(*id)?);
            }
            Ok((covering, nodes, tree.root_id()))
        })?;
        let root_networks: Vec<RootNetworkId> = match root_networks {
            Some(ids) => ids.to_vec(),
            None => self
                .repos
                .root_networks
                .root_networks(study_id)
                .into_iter()
                .map(|rn| rn.id)
                .collect(),
        };

        let mut leftovers = Leftovers::default();
        let mut cleared_results = 0;
        for node_id in &nodes {
            for rn in &root_networks {
                let reset = self.repos.root_networks.update(*node_id, *rn, |info| {
                    let previous = info.build_status;
                    if *node_id != root_id {
                        info.build_status = BuildStatus::NotBuilt;
                    }
                    (previous, info.build_status, info.take_results())
                });
                let Ok((previous, current, cleared)) = reset else {
                    continue;
                };
                for (computation, run) in cleared {
                    self.notifier.publish(StudyNotification::for_node(
                        study_id,
                        *node_id,
                        *rn,
                        UpdateType::ComputationStatus(computation),
                    ));
                    leftovers.push(computation, run);
                    cleared_results += 1;
                }
                if previous != current {
                    self.notifier.publish(StudyNotification::for_node(
                        study_id,
                        *node_id,
                        *rn,
                        UpdateType::BuildStatus,
                    ));
                }
            }
        }

        info!(
            study_id = %study_id,
            covering = covering.len(),
            nodes = nodes.len(),
            cleared_results,
            "nodes invalidated"
        );
        self.spawn_remote_cleanup(leftovers);
        Ok(InvalidationSummary {
            covering,
            invalidated_nodes: nodes.len(),
            cleared_results,
        })
    }

    /// Remote cleanup for records dropped along with their node or root network
    pub fn discard_records(&self, records: impl IntoIterator<Item = RootNetworkNodeInfo>) {
        let mut leftovers = Leftovers::default();
        for mut info in records {
            for (computation, run) in info.take_results() {
                leftovers.push(computation, run);
            }
        }
        self.spawn_remote_cleanup(leftovers);
    }

    fn spawn_remote_cleanup(&self, leftovers: Leftovers) {
        if leftovers.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime available, remote results left in place");
            return;
        };
        let engines = self.engines.clone();
        let reports = Arc::clone(&self.reports);
        runtime.spawn(async move {
            for (computation, result_ids) in leftovers.results {
                let outcome = match engines.get(computation) {
                    Ok(engine) => engine.delete_results(&result_ids).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                if let Err(error) = outcome {
                    warn!(computation = %computation, count = result_ids.len(), %error, "remote result cleanup failed");
                }
            }
            let unique: Vec<Uuid> = leftovers.reports.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
            if let Err(error) = reports.delete_reports(&unique).await {
                warn!(count = unique.len(), %error, "report cleanup failed");
            }
        });
    }
}
