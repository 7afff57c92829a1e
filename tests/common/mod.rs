#![allow(dead_code)]
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use grid_study::config::Config;
use grid_study::consumer::BusMessage;
use grid_study::controller::{AppState, NewRootNetwork, StudyCreated};
use grid_study::domain::{
    BuildStatus, ComputationType, InsertMode, NodeContext, NodeId, NodeSpec, NodeSubtype,
    ReceiverToken,
};
use grid_study::engine::{
    BuildRequest, ComputationEngine, EngineError, EngineRegistry, NetworkBuilder, ReportService,
    ResultQuery, RunAccepted, RunRequest,
};
use grid_study::notification::StudyNotification;
use grid_study::repo::Repositories;

/// In-process computation engine recording every call
pub struct FakeEngine {
    computation: ComputationType,
    /// Engine finishes the computation inside the run call
    synchronous: bool,
    /// Simulate a remote failure on run and delete
    fail_runs: Mutex<bool>,
    pub runs: Mutex<Vec<RunRequest>>,
    pub stops: Mutex<Vec<(Uuid, String)>>,
    pub deleted: Mutex<Vec<Uuid>>,
    known: Mutex<HashSet<Uuid>>,
    /// Runs once inside the next run call, before it answers
    on_run: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl FakeEngine {
    pub fn new(computation: ComputationType) -> Self {
        Self {
            computation,
            synchronous: false,
            fail_runs: Mutex::new(false),
            runs: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            known: Mutex::new(HashSet::new()),
            on_run: Mutex::new(None),
        }
    }

    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail_runs.lock() = failing;
    }

    pub fn before_accepting(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_run.lock() = Some(Box::new(hook));
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }

    pub fn last_receiver(&self) -> Option<String> {
        self.runs.lock().last().map(|r| r.receiver.clone())
    }
}

#[async_trait]
impl ComputationEngine for FakeEngine {
    fn computation_type(&self) -> ComputationType {
        self.computation
    }

    async fn run(&self, request: &RunRequest) -> Result<RunAccepted, EngineError> {
        if *self.fail_runs.lock() {
            return Err(EngineError::Status {
                status: 500,
                body: "engine down".to_string(),
            });
        }
        let hook = self.on_run.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        let result_id = Uuid::new_v4();
        self.runs.lock().push(request.clone());
        self.known.lock().insert(result_id);
        Ok(RunAccepted {
            result_id,
            completed: self.synchronous,
        })
    }

    async fn stop(&self, result_id: Uuid, receiver: &str) -> Result<(), EngineError> {
        self.stops.lock().push((result_id, receiver.to_string()));
        Ok(())
    }

    async fn status(&self, result_id: Uuid) -> Result<Option<String>, EngineError> {
        if self.known.lock().contains(&result_id) {
            Ok(Some("RUNNING".to_string()))
        } else {
            Err(EngineError::NotFound(format!("result {}", result_id)))
        }
    }

    async fn result(&self, result_id: Uuid, query: &ResultQuery) -> Result<Option<Value>, EngineError> {
        if self.known.lock().contains(&result_id) {
            Ok(Some(json!({ "resultUuid": result_id, "query": query })))
        } else {
            Err(EngineError::NotFound(format!("result {}", result_id)))
        }
    }

    async fn delete_results(&self, result_ids: &[Uuid]) -> Result<(), EngineError> {
        if *self.fail_runs.lock() {
            return Err(EngineError::Status {
                status: 500,
                body: "engine down".to_string(),
            });
        }
        let mut known = self.known.lock();
        for id in result_ids {
            known.remove(id);
        }
        self.deleted.lock().extend_from_slice(result_ids);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeReports {
    pub deleted: Mutex<Vec<Uuid>>,
    failing: Mutex<bool>,
}

impl FakeReports {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl ReportService for FakeReports {
    async fn delete_reports(&self, report_ids: &[Uuid]) -> Result<(), EngineError> {
        if *self.failing.lock() {
            return Err(EngineError::Status {
                status: 503,
                body: "report store down".to_string(),
            });
        }
        self.deleted.lock().extend_from_slice(report_ids);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBuilder {
    pub requests: Mutex<Vec<BuildRequest>>,
}

#[async_trait]
impl NetworkBuilder for FakeBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<(), EngineError> {
        self.requests.lock().push(request.clone());
        Ok(())
    }

    async fn stop_build(&self, _receiver: &str) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A study `root → n1 (construction) → n2 (security)` with both nodes built
pub struct Harness {
    pub state: AppState,
    pub engines: Vec<Arc<FakeEngine>>,
    pub reports: Arc<FakeReports>,
    pub builder: Arc<FakeBuilder>,
    pub study: StudyCreated,
    pub n1: NodeId,
    pub n2: NodeId,
    pub notifications: broadcast::Receiver<StudyNotification>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_engines(ComputationType::all().map(FakeEngine::new).collect())
    }

    pub fn with_engines(engines: Vec<FakeEngine>) -> Self {
        let engines: Vec<Arc<FakeEngine>> = engines.into_iter().map(Arc::new).collect();
        let mut registry = EngineRegistry::new();
        for engine in &engines {
            registry.register(engine.clone());
        }
        let reports = Arc::new(FakeReports::default());
        let builder = Arc::new(FakeBuilder::default());
        let state = AppState::from_parts(
            Config::default(),
            Repositories::new(),
            registry,
            reports.clone(),
            builder.clone(),
        );
        let notifications = state.notifications.subscribe();
        let study = state
            .studies
            .create_study(NewRootNetwork {
                name: "base".to_string(),
                network_uuid: Uuid::new_v4(),
                case_uuid: Uuid::new_v4(),
            })
            .expect("study created");
        let n1 = state
            .studies
            .insert_node(
                study.study_uuid,
                study.root_node.id,
                InsertMode::Child,
                NodeSpec::named("n1", NodeSubtype::Construction),
                None,
            )
            .expect("n1 inserted")
            .id;
        let n2 = state
            .studies
            .insert_node(
                study.study_uuid,
                n1,
                InsertMode::Child,
                NodeSpec::named("n2", NodeSubtype::Security),
                None,
            )
            .expect("n2 inserted")
            .id;
        let mut harness = Self {
            state,
            engines,
            reports,
            builder,
            study,
            n1,
            n2,
            notifications,
        };
        harness.mark_built(n1);
        harness.mark_built(n2);
        harness.drain();
        harness
    }

    pub fn ctx(&self, node: NodeId) -> NodeContext {
        NodeContext::new(self.study.study_uuid, node, self.study.root_network.id)
    }

    pub fn root(&self) -> NodeId {
        self.study.root_node.id
    }

    pub fn engine(&self, computation: ComputationType) -> Arc<FakeEngine> {
        self.engines
            .iter()
            .find(|e| e.computation_type() == computation)
            .cloned()
            .expect("engine registered")
    }

    pub fn mark_built(&mut self, node: NodeId) {
        self.state
            .repos
            .root_networks
            .update_build_status(node, self.study.root_network.id, BuildStatus::Built)
            .expect("record exists");
    }

    pub fn slot(&self, node: NodeId, computation: ComputationType) -> Option<grid_study::domain::ComputationRun> {
        self.state
            .repos
            .root_networks
            .computation_result(node, self.study.root_network.id, computation)
    }

    /// Event as an engine would send it for a run on `node`
    pub fn event(&self, node: NodeId, result_id: Option<Uuid>) -> BusMessage {
        let receiver = ReceiverToken::new(node, self.study.root_network.id, "alice")
            .encode()
            .expect("token encodes");
        let mut msg = BusMessage::new().with_header("receiver", receiver);
        if let Some(id) = result_id {
            msg = msg.with_header("resultUuid", id.to_string());
        }
        msg
    }

    /// Notification names received since the last drain
    pub fn drain(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            names.push(n.update.name());
        }
        names
    }
}
