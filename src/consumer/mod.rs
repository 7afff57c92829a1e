//! Inbound event reconciliation.
//!
//! Remote engines report completion through bus destinations. Each event
//! carries the receiver token handed out at run time; the consumer decodes it,
//! resolves the (node, root network) record and applies the event as a single
//! assignment on that record. Events may arrive late, twice, or for records that
//! no longer exist: those are dropped with a log line and never surface as
//! errors.

pub mod message;

pub use message::{BuildOutcome, BusMessage, Destination, Outcome};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::MessageHub;
use crate::domain::{
    BuildStatus, ComputationRun, ComputationType, NodeId, ReceiverToken, RootNetworkId, RunState,
    SlotPolicy, StudyId,
};
use crate::notification::{NotificationPublisher, StudyNotification, UpdateType};
use crate::repo::Repositories;

/// What became of one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    Ignored(&'static str),
    /// Names a run other than the registered one, or no run at all
    Stale { registered: Option<Uuid> },
}

struct Target {
    study_id: StudyId,
    node_id: NodeId,
    root_network_id: RootNetworkId,
    token: ReceiverToken,
}

pub struct ResultConsumer {
    repos: Repositories,
    notifier: Arc<dyn NotificationPublisher>,
}

impl ResultConsumer {
    pub fn new(repos: Repositories, notifier: Arc<dyn NotificationPublisher>) -> Self {
        Self { repos, notifier }
    }

    pub fn dispatch(&self, destination: Destination, message: &BusMessage) -> Disposition {
        let disposition = match destination {
            Destination::Computation(computation, outcome) => self.handle(computation, outcome, message),
            Destination::Build(outcome) => self.handle_build(outcome, message),
        };
        match &disposition {
            Disposition::Applied => {}
            Disposition::Ignored(reason) => {
                warn!(%destination, reason, "bus event ignored");
            }
            Disposition::Stale { registered } => {
                warn!(
                    %destination,
                    registered_result_id = ?registered,
                    result_id = ?message.result_uuid(),
                    "stale bus event dropped"
                );
            }
        }
        disposition
    }

    fn resolve(&self, message: &BusMessage) -> Result<Target, &'static str> {
        if message.header(message::HEADER_RECEIVER).is_none() {
            return Err("missing receiver");
        }
        let token = message.receiver().ok_or("undecodable receiver")?;
        let study_id = self
            .repos
            .tree
            .study_of(token.node_uuid)
            .ok_or("node no longer exists")?;
        if !self
            .repos
            .root_networks
            .contains(token.node_uuid, token.root_network_uuid)
        {
            return Err("record no longer exists");
        }
        Ok(Target {
            study_id,
            node_id: token.node_uuid,
            root_network_id: token.root_network_uuid,
            token,
        })
    }

    fn notify(&self, target: &Target, update: UpdateType) -> StudyNotification {
        StudyNotification::for_node(target.study_id, target.node_id, target.root_network_id, update)
    }

    pub fn handle(&self, computation: ComputationType, outcome: Outcome, message: &BusMessage) -> Disposition {
        let target = match self.resolve(message) {
            Ok(target) => target,
            Err(reason) => return Disposition::Ignored(reason),
        };
        let result_id = message.result_uuid();
        let descriptor = computation.descriptor();

        match outcome {
            Outcome::Result => {
                let Some(result_id) = result_id else {
                    return Disposition::Ignored("missing resultUuid");
                };
                if let Err(registered) = self.transition(&target, computation, Some(result_id), |current| {
                    Some(ComputationRun {
                        result_id,
                        report_id: current.and_then(|run| run.report_id),
                        state: RunState::Succeeded,
                    })
                }) {
                    return registered;
                }
                info!(
                    node_id = %target.node_id,
                    root_network_id = %target.root_network_id,
                    computation = %computation,
                    %result_id,
                    "computation result applied"
                );
                self.notifier
                    .publish(self.notify(&target, UpdateType::ComputationStatus(computation)));
                self.notifier.publish(
                    self.notify(&target, UpdateType::ComputationResult(computation))
                        .with_result(result_id),
                );
            }
            Outcome::Stopped => {
                if let Err(registered) = self.transition(&target, computation, result_id, |current| {
                    terminal(current, result_id, descriptor.on_stop, RunState::Stopped)
                }) {
                    return registered;
                }
                info!(
                    node_id = %target.node_id,
                    root_network_id = %target.root_network_id,
                    computation = %computation,
                    "computation stopped"
                );
                self.notifier
                    .publish(self.notify(&target, UpdateType::ComputationStatus(computation)));
            }
            Outcome::Failed => {
                if let Err(registered) = self.transition(&target, computation, result_id, |current| {
                    terminal(current, result_id, descriptor.on_failure, RunState::Failed)
                }) {
                    return registered;
                }
                let error = message.message().unwrap_or("computation failed");
                info!(
                    node_id = %target.node_id,
                    root_network_id = %target.root_network_id,
                    computation = %computation,
                    error,
                    "computation failed"
                );
                self.notifier.publish(
                    self.notify(&target, UpdateType::ComputationFailed(computation))
                        .with_user(target.token.user_id.clone())
                        .with_error(error),
                );
            }
            Outcome::CancelFailed => {
                let user = message.user_id().unwrap_or(&target.token.user_id).to_string();
                let mut notification = self
                    .notify(&target, UpdateType::ComputationCancelFailed(computation))
                    .with_user(user);
                if let Some(error) = message.message() {
                    notification = notification.with_error(error);
                }
                info!(node_id = %target.node_id, computation = %computation, "computation cancel failed");
                self.notifier.publish(notification);
            }
            Outcome::Debug => {
                let user = message.user_id().unwrap_or(&target.token.user_id).to_string();
                let mut notification = self
                    .notify(&target, UpdateType::ComputationDebug(computation))
                    .with_user(user);
                if let Some(result_id) = result_id {
                    notification = notification.with_result(result_id);
                }
                if let Some(error) = message.message() {
                    notification = notification.with_error(error);
                }
                self.notifier.publish(notification);
            }
        }
        Disposition::Applied
    }

    /// Assigns the slot unless the event names a result other than the
    /// registered one. An empty slot only accepts events while a run request
    /// for the key is in flight.
    fn transition(
        &self,
        target: &Target,
        computation: ComputationType,
        event_result: Option<Uuid>,
        next: impl FnOnce(Option<ComputationRun>) -> Option<ComputationRun>,
    ) -> Result<(), Disposition> {
        let key = (target.node_id, target.root_network_id, computation);
        self.repos
            .root_networks
            .update(target.node_id, target.root_network_id, |info| {
                let current = info.result(computation).copied();
                match (current, event_result) {
                    (Some(run), Some(event_result)) if run.result_id != event_result => {
                        return Err(Disposition::Stale {
                            registered: Some(run.result_id),
                        });
                    }
                    (None, _) if !self.repos.claims.is_held(key) => {
                        return Err(Disposition::Stale { registered: None });
                    }
                    _ => {}
                }
                match next(current) {
                    Some(run) => info.computation_results.insert(computation, run),
                    None => info.computation_results.remove(&computation),
                };
                Ok(())
            })
            .unwrap_or(Err(Disposition::Ignored("record no longer exists")))
    }

    pub fn handle_build(&self, outcome: BuildOutcome, message: &BusMessage) -> Disposition {
        let target = match self.resolve(message) {
            Ok(target) => target,
            Err(reason) => return Disposition::Ignored(reason),
        };
        let next = match outcome {
            BuildOutcome::Built => BuildStatus::Built,
            BuildOutcome::Failed => BuildStatus::BuildFailed,
            BuildOutcome::Stopped => BuildStatus::NotBuilt,
        };
        let applied = self
            .repos
            .root_networks
            .update(target.node_id, target.root_network_id, |info| {
                // An invalidation since the request was sent wins over the event
                if info.build_status != BuildStatus::Building {
                    return false;
                }
                info.build_status = next;
                true
            })
            .unwrap_or(false);
        if !applied {
            return Disposition::Ignored("node is not building");
        }
        info!(
            node_id = %target.node_id,
            root_network_id = %target.root_network_id,
            build_status = %next,
            "build event applied"
        );
        let mut notification = self
            .notify(&target, UpdateType::BuildStatus)
            .with_user(target.token.user_id.clone());
        if outcome == BuildOutcome::Failed {
            notification = notification.with_error(message.message().unwrap_or("build failed"));
        }
        self.notifier.publish(notification);
        Disposition::Applied
    }

    /// Starts one task per inbound destination still owned by the hub
    pub fn spawn(self: &Arc<Self>, hub: &MessageHub) -> Vec<JoinHandle<()>> {
        hub.take_receivers()
            .into_iter()
            .map(|(destination, mut rx)| {
                let consumer = Arc::clone(self);
                tokio::spawn(async move {
                    while let Some(message) = rx.recv().await {
                        consumer.dispatch(destination, &message);
                    }
                    warn!(%destination, "bus destination closed");
                })
            })
            .collect()
    }
}

/// Slot value after a stop or failure under `policy`
fn terminal(
    current: Option<ComputationRun>,
    event_result: Option<Uuid>,
    policy: SlotPolicy,
    state: RunState,
) -> Option<ComputationRun> {
    match policy {
        SlotPolicy::Clear => None,
        SlotPolicy::Retain => match (current, event_result) {
            (Some(run), _) => Some(ComputationRun { state, ..run }),
            (None, Some(result_id)) => Some(ComputationRun {
                result_id,
                report_id: None,
                state,
            }),
            (None, None) => None,
        },
    }
}
