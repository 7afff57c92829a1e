//! Root networks and the per-(node, root network) state records.
//!
//! Records live behind their own mutex so that writers on one key never wait
//! on writers of another key. The outer map lock is only held long enough to
//! fetch or insert an entry. Guards are `parking_lot` ones, which are not
//! `Send`, so none can be held across an `.await`.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{
    BuildStatus, ComputationRun, ComputationType, NodeId, RootNetwork, RootNetworkId,
    RootNetworkNodeInfo, StudyId,
};
use crate::error::{StudyError, StudyResult};

pub type InfoKey = (NodeId, RootNetworkId);

#[derive(Default)]
pub struct RootNetworkRegistry {
    networks: RwLock<HashMap<StudyId, Vec<RootNetwork>>>,
    infos: RwLock<HashMap<InfoKey, Arc<Mutex<RootNetworkNodeInfo>>>>,
}

impl RootNetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root_network(&self, study_id: StudyId, root_network: RootNetwork) {
        self.networks
            .write()
            .entry(study_id)
            .or_default()
            .push(root_network);
    }

    pub fn root_networks(&self, study_id: StudyId) -> Vec<RootNetwork> {
        self.networks
            .read()
            .get(&study_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn root_network(&self, study_id: StudyId, id: RootNetworkId) -> StudyResult<RootNetwork> {
        self.networks
            .read()
            .get(&study_id)
            .and_then(|rns| rns.iter().find(|rn| rn.id == id).cloned())
            .ok_or_else(|| StudyError::not_found("root network", id))
    }

    /// Detaches a root network and drops every record evaluated against it
    pub fn remove_root_network(
        &self,
        study_id: StudyId,
        id: RootNetworkId,
    ) -> StudyResult<Vec<(NodeId, RootNetworkNodeInfo)>> {
        {
            let mut networks = self.networks.write();
            let rns = networks
                .get_mut(&study_id)
                .ok_or_else(|| StudyError::not_found("study", study_id))?;
            let before = rns.len();
            rns.retain(|rn| rn.id != id);
            if rns.len() == before {
                return Err(StudyError::not_found("root network", id));
            }
        }
        let mut infos = self.infos.write();
        let keys: Vec<InfoKey> = infos.keys().filter(|(_, rn)| *rn == id).copied().collect();
        Ok(keys
            .into_iter()
            .filter_map(|key| infos.remove(&key).map(|info| (key.0, info.lock().clone())))
            .collect())
    }

    pub fn create(&self, node_id: NodeId, root_network_id: RootNetworkId, info: RootNetworkNodeInfo) {
        self.infos
            .write()
            .insert((node_id, root_network_id), Arc::new(Mutex::new(info)));
    }

    /// Drops the records of a node across all root networks
    pub fn remove_node(&self, node_id: NodeId) -> Vec<(RootNetworkId, RootNetworkNodeInfo)> {
        let mut infos = self.infos.write();
        let keys: Vec<InfoKey> = infos.keys().filter(|(n, _)| *n == node_id).copied().collect();
        keys.into_iter()
            .filter_map(|key| infos.remove(&key).map(|info| (key.1, info.lock().clone())))
            .collect()
    }

    fn entry(&self, node_id: NodeId, root_network_id: RootNetworkId) -> Option<Arc<Mutex<RootNetworkNodeInfo>>> {
        self.infos.read().get(&(node_id, root_network_id)).cloned()
    }

    pub fn find(&self, node_id: NodeId, root_network_id: RootNetworkId) -> Option<RootNetworkNodeInfo> {
        self.entry(node_id, root_network_id)
            .map(|info| info.lock().clone())
    }

    pub fn get(&self, node_id: NodeId, root_network_id: RootNetworkId) -> StudyResult<RootNetworkNodeInfo> {
        self.find(node_id, root_network_id)
            .ok_or_else(|| record_not_found(node_id, root_network_id))
    }

    pub fn contains(&self, node_id: NodeId, root_network_id: RootNetworkId) -> bool {
        self.infos.read().contains_key(&(node_id, root_network_id))
    }

    /// Runs `f` with exclusive access to one record
    pub fn update<R>(
        &self,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        f: impl FnOnce(&mut RootNetworkNodeInfo) -> R,
    ) -> StudyResult<R> {
        let entry = self
            .entry(node_id, root_network_id)
            .ok_or_else(|| record_not_found(node_id, root_network_id))?;
        let mut info = entry.lock();
        Ok(f(&mut info))
    }

    /// Sets the build status, returning the previous one
    pub fn update_build_status(
        &self,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        status: BuildStatus,
    ) -> StudyResult<BuildStatus> {
        self.update(node_id, root_network_id, |info| {
            std::mem::replace(&mut info.build_status, status)
        })
    }

    /// Assigns a result slot, returning what it held before
    pub fn set_computation_result(
        &self,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        computation: ComputationType,
        run: Option<ComputationRun>,
    ) -> StudyResult<Option<ComputationRun>> {
        self.update(node_id, root_network_id, |info| match run {
            Some(run) => info.computation_results.insert(computation, run),
            None => info.computation_results.remove(&computation),
        })
    }

    /// Absent record and empty slot both read as "no result"
    pub fn computation_result(
        &self,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        computation: ComputationType,
    ) -> Option<ComputationRun> {
        self.entry(node_id, root_network_id)
            .and_then(|info| info.lock().result(computation).copied())
    }

    /// Every record currently holding a result for `computation`
    pub fn entries_with_result(&self, computation: ComputationType) -> Vec<(InfoKey, ComputationRun)> {
        let entries: Vec<(InfoKey, Arc<Mutex<RootNetworkNodeInfo>>)> = self
            .infos
            .read()
            .iter()
            .map(|(key, info)| (*key, Arc::clone(info)))
            .collect();
        entries
            .into_iter()
            .filter_map(|(key, info)| info.lock().result(computation).map(|run| (key, *run)))
            .collect()
    }

    /// Empties a slot only if it still holds `result_id`
    pub fn clear_if_matches(
        &self,
        node_id: NodeId,
        root_network_id: RootNetworkId,
        computation: ComputationType,
        result_id: uuid::Uuid,
    ) -> bool {
        self.update(node_id, root_network_id, |info| {
            match info.result(computation) {
                Some(run) if run.result_id == result_id => {
                    info.computation_results.remove(&computation);
                    true
                }
                _ => false,
            }
        })
        .unwrap_or(false)
    }
}

fn record_not_found(node_id: NodeId, root_network_id: RootNetworkId) -> StudyError {
    StudyError::not_found("node info", format!("{}@{}", node_id, root_network_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunState;
    use uuid::Uuid;

    fn registry_with(node: NodeId, rn: RootNetworkId) -> RootNetworkRegistry {
        let registry = RootNetworkRegistry::new();
        registry.create(node, rn, RootNetworkNodeInfo::for_modification_node());
        registry
    }

    #[test]
    fn missing_record_is_not_found_but_reads_as_no_result() {
        let registry = RootNetworkRegistry::new();
        let (node, rn) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(registry.get(node, rn), Err(StudyError::NotFound { .. })));
        assert_eq!(registry.computation_result(node, rn, ComputationType::LoadFlow), None);
    }

    #[test]
    fn result_slots_are_independent() {
        let (node, rn) = (Uuid::new_v4(), Uuid::new_v4());
        let registry = registry_with(node, rn);
        let run = ComputationRun::running(Uuid::new_v4(), Uuid::new_v4());
        registry
            .set_computation_result(node, rn, ComputationType::SecurityAnalysis, Some(run))
            .unwrap();
        assert_eq!(
            registry.computation_result(node, rn, ComputationType::SecurityAnalysis),
            Some(run)
        );
        assert_eq!(registry.computation_result(node, rn, ComputationType::LoadFlow), None);
    }

    #[test]
    fn set_result_returns_previous_value() {
        let (node, rn) = (Uuid::new_v4(), Uuid::new_v4());
        let registry = registry_with(node, rn);
        let first = ComputationRun::running(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            registry.set_computation_result(node, rn, ComputationType::LoadFlow, Some(first)).unwrap(),
            None
        );
        assert_eq!(
            registry.set_computation_result(node, rn, ComputationType::LoadFlow, None).unwrap(),
            Some(first)
        );
    }

    #[test]
    fn clear_if_matches_ignores_other_ids() {
        let (node, rn) = (Uuid::new_v4(), Uuid::new_v4());
        let registry = registry_with(node, rn);
        let run = ComputationRun {
            result_id: Uuid::new_v4(),
            report_id: None,
            state: RunState::Succeeded,
        };
        registry
            .set_computation_result(node, rn, ComputationType::ShortCircuit, Some(run))
            .unwrap();
        assert!(!registry.clear_if_matches(node, rn, ComputationType::ShortCircuit, Uuid::new_v4()));
        assert!(registry.clear_if_matches(node, rn, ComputationType::ShortCircuit, run.result_id));
        assert!(registry.entries_with_result(ComputationType::ShortCircuit).is_empty());
    }

    #[test]
    fn removing_root_network_drops_its_records_only() {
        let registry = RootNetworkRegistry::new();
        let study = Uuid::new_v4();
        let node = Uuid::new_v4();
        let rns: Vec<RootNetwork> = (0..2)
            .map(|i| RootNetwork {
                id: Uuid::new_v4(),
                name: format!("rn{i}"),
                network_ref: Uuid::new_v4(),
                case_ref: Uuid::new_v4(),
            })
            .collect();
        for rn in &rns {
            registry.add_root_network(study, rn.clone());
            registry.create(node, rn.id, RootNetworkNodeInfo::for_modification_node());
        }
        let removed = registry.remove_root_network(study, rns[0].id).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!registry.contains(node, rns[0].id));
        assert!(registry.contains(node, rns[1].id));
        assert_eq!(registry.root_networks(study), vec![rns[1].clone()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_distinct_keys() {
        let registry = Arc::new(RootNetworkRegistry::new());
        let rn = Uuid::new_v4();
        let nodes: Vec<NodeId> = (0..16).map(|_| Uuid::new_v4()).collect();
        for node in &nodes {
            registry.create(*node, rn, RootNetworkNodeInfo::for_modification_node());
        }
        let handles: Vec<_> = nodes
            .iter()
            .map(|node| {
                let registry = Arc::clone(&registry);
                let node = *node;
                tokio::spawn(async move {
                    for _ in 0..100 {
                        registry
                            .update_build_status(node, rn, BuildStatus::Building)
                            .unwrap();
                        registry.update_build_status(node, rn, BuildStatus::Built).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        for node in &nodes {
            assert_eq!(registry.get(*node, rn).unwrap().build_status, BuildStatus::Built);
        }
    }
}
