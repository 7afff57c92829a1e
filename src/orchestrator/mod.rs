//! Computation orchestration.
//!
//! `run` validates the target, claims the (node, root network, type) key,
//! calls the remote engine with a receiver token and persists the returned
//! result id before answering. Completion arrives later through the
//! [`crate::consumer::ResultConsumer`]. Stop, status and result are
//! passthroughs keyed by the registered result id.

pub mod supervision;

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    ComputationRun, ComputationType, NodeContext, ReceiverToken, RunState, StudyId,
};
use crate::engine::{EngineRegistry, ReportService, ResultQuery, RunRequest};
use crate::error::{StudyError, StudyResult};
use crate::notification::{NotificationPublisher, StudyNotification, UpdateType};
use crate::repo::Repositories;

pub struct ComputationOrchestrator {
    repos: Repositories,
    engines: EngineRegistry,
    reports: Arc<dyn ReportService>,
    notifier: Arc<dyn NotificationPublisher>,
}

impl ComputationOrchestrator {
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

    fn check_target(&self, ctx: &NodeContext) -> StudyResult<()> {
        self.repos.tree.node(ctx.study_id, ctx.node_id)?;
        self.repos
            .root_networks
            .root_network(ctx.study_id, ctx.root_network_id)?;
        Ok(())
    }

    pub async fn run(
        &self,
        ctx: NodeContext,
        computation: ComputationType,
        user_id: &str,
        parameters: Option<Value>,
    ) -> StudyResult<Uuid> {
        let node = self.repos.tree.node(ctx.study_id, ctx.node_id)?;
        let root_network = self
            .repos
            .root_networks
            .root_network(ctx.study_id, ctx.root_network_id)?;
        let descriptor = computation.descriptor();

        if node.is_root() {
            return Err(StudyError::forbidden(
                "ROOT_NODE_NOT_COMPUTABLE",
                format!("{} cannot run on the root node", computation),
            ));
        }
        if !computation.allowed_on(&node) {
            return Err(StudyError::forbidden(
                "SECURITY_NODE_REQUIRED",
                format!("{} only runs on security nodes", computation),
            ));
        }
        if node.stashed {
            return Err(StudyError::forbidden(
                "NODE_STASHED",
                format!("node {} is stashed", node.id),
            ));
        }

        let _claim = self
            .repos
            .claims
            .claim((ctx.node_id, ctx.root_network_id, computation))
            .ok_or(StudyError::NotRunnable {
                code: descriptor.not_runnable_code,
            })?;
        let info = self.repos.root_networks.get(ctx.node_id, ctx.root_network_id)?;
        if !info.build_status.is_built() {
            return Err(StudyError::forbidden(
                "NODE_NOT_BUILT",
                format!("node {} is {}", node.id, info.build_status),
            ));
        }
        if info.result(computation).is_some_and(ComputationRun::is_active) {
            return Err(StudyError::NotRunnable {
                code: descriptor.not_runnable_code,
            });
        }

        let parameters = parameters.or_else(|| self.repos.parameters.get(ctx.study_id, computation));
        let receiver = ReceiverToken::new(ctx.node_id, ctx.root_network_id, user_id).encode()?;
        let report_id = Uuid::new_v4();
        let engine = self.engines.get(computation)?;
        let accepted = engine
            .run(&RunRequest {
                network_ref: root_network.network_ref,
                variant_id: info.variant_id.clone(),
                receiver,
                report_id,
                reporter_id: ctx.node_id,
                user_id: user_id.to_string(),
                parameters,
            })
            .await?;

        let state = if accepted.completed {
            RunState::Succeeded
        } else {
            RunState::Running
        };
        let run = ComputationRun {
            result_id: accepted.result_id,
            report_id: Some(report_id),
            state,
        };
        let persisted = self
            .repos
            .root_networks
            .update(ctx.node_id, ctx.root_network_id, |info| {
                // An invalidation landed while the engine was working
                if !info.build_status.is_built() {
                    if info.result(computation).is_some_and(|r| r.result_id == run.result_id) {
                        info.computation_results.remove(&computation);
                    }
                    return Err(info.build_status);
                }
                let previous = info.result(computation).copied();
                Ok(match previous {
                    // The completion event won the race against this write
                    Some(current) if current.result_id == run.result_id => None,
                    _ => {
                        info.computation_results.insert(computation, run);
                        previous
                    }
                })
            });
        let replaced = match persisted {
            Ok(Ok(replaced)) => replaced,
            Ok(Err(status)) => {
                warn!(
                    node_id = %ctx.node_id,
                    computation = %computation,
                    result_id = %run.result_id,
                    build_status = %status,
                    "node invalidated during run, result discarded"
                );
                self.discard(computation, run);
                return Err(StudyError::forbidden(
                    "NODE_NOT_BUILT",
                    format!("node {} is {}", node.id, status),
                ));
            }
            Err(error) => {
                self.discard(computation, run);
                return Err(error);
            }
        };

        info!(
            node_id = %ctx.node_id,
            root_network_id = %ctx.root_network_id,
            computation = %computation,
            result_id = %accepted.result_id,
            completed = accepted.completed,
            "computation started"
        );
        self.notifier.publish(
            StudyNotification::for_node(
                ctx.study_id,
                ctx.node_id,
                ctx.root_network_id,
                UpdateType::ComputationStatus(computation),
            )
            .with_user(user_id),
        );
        if accepted.completed {
            self.notifier.publish(
                StudyNotification::for_node(
                    ctx.study_id,
                    ctx.node_id,
                    ctx.root_network_id,
                    UpdateType::ComputationResult(computation),
                )
                .with_result(accepted.result_id),
            );
        }
        if let Some(previous) = replaced {
            self.discard(computation, previous);
        }
        Ok(accepted.result_id)
    }

    /// Deletes a run's result and report in the background
    fn discard(&self, computation: ComputationType, run: ComputationRun) {
        let engines = self.engines.clone();
        let reports = Arc::clone(&self.reports);
        tokio::spawn(async move {
            match engines.get(computation) {
                Ok(engine) => {
                    if let Err(error) = engine.delete_results(&[run.result_id]).await {
                        warn!(computation = %computation, result_id = %run.result_id, %error, "discarded result not deleted");
                    }
                }
                Err(error) => warn!(computation = %computation, %error, "discarded result not deleted"),
            }
            if let Some(report_id) = run.report_id {
                if let Err(error) = reports.delete_reports(&[report_id]).await {
                    warn!(%report_id, %error, "discarded report not deleted");
                }
            }
        });
    }

    /// Asks the engine to stop the registered run. The slot is left as is: the
    /// engine answers with a `stopped` event.
    pub async fn stop(&self, ctx: NodeContext, computation: ComputationType, user_id: &str) -> StudyResult<()> {
        self.check_target(&ctx)?;
        let Some(run) = self
            .repos
            .root_networks
            .computation_result(ctx.node_id, ctx.root_network_id, computation)
        else {
            debug!(node_id = %ctx.node_id, computation = %computation, "nothing to stop");
            return Ok(());
        };
        let receiver = ReceiverToken::new(ctx.node_id, ctx.root_network_id, user_id).encode()?;
        self.engines
            .get(computation)?
            .stop(run.result_id, &receiver)
            .await?;
        info!(
            node_id = %ctx.node_id,
            root_network_id = %ctx.root_network_id,
            computation = %computation,
            result_id = %run.result_id,
            "computation stop requested"
        );
        Ok(())
    }

    pub async fn status(&self, ctx: NodeContext, computation: ComputationType) -> StudyResult<Option<String>> {
        self.check_target(&ctx)?;
        let Some(run) = self
            .repos
            .root_networks
            .computation_result(ctx.node_id, ctx.root_network_id, computation)
        else {
            return Ok(None);
        };
        debug!(computation = %computation, result_id = %run.result_id, "status passthrough");
        Ok(self.engines.get(computation)?.status(run.result_id).await?)
    }

    pub async fn result(
        &self,
        ctx: NodeContext,
        computation: ComputationType,
        query: &ResultQuery,
    ) -> StudyResult<Option<Value>> {
        self.check_target(&ctx)?;
        let Some(run) = self
            .repos
            .root_networks
            .computation_result(ctx.node_id, ctx.root_network_id, computation)
        else {
            return Ok(None);
        };
        debug!(computation = %computation, result_id = %run.result_id, "result passthrough");
        Ok(self.engines.get(computation)?.result(run.result_id, query).await?)
    }

    pub fn parameters(&self, study_id: StudyId, computation: ComputationType) -> StudyResult<Option<Value>> {
        self.repos.tree.root(study_id)?;
        Ok(self.repos.parameters.get(study_id, computation))
    }

    pub fn set_parameters(
        &self,
        study_id: StudyId,
        computation: ComputationType,
        parameters: Value,
        user_id: Option<&str>,
    ) -> StudyResult<bool> {
        self.repos.tree.root(study_id)?;
        let changed = self.repos.parameters.set(study_id, computation, parameters);
        if changed {
            let mut notification =
                StudyNotification::new(study_id, UpdateType::ComputationParameters(computation));
            if let Some(user) = user_id {
                notification = notification.with_user(user);
            }
            self.notifier.publish(notification);
        }
        Ok(changed)
    }
}
