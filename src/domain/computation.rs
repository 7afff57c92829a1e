//! Computation types and their per-type lifecycle rules.
//!
//! Every long-running analysis a study can launch is described by a static
//! [`ComputationDescriptor`]: its REST path segment, its message-bus
//! destination prefix, the notification names sent to UI clients, the error
//! code returned when a run is already pending, and what happens to the stored
//! result when the remote engine reports a stop or a failure.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};
use uuid::Uuid;

use super::node::{Node, NodeSubtype};

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "snake_case")]
pub enum ComputationType {
    LoadFlow,
    SecurityAnalysis,
    SensitivityAnalysis,
    NonEvacuatedEnergyAnalysis,
    VoltageInitialization,
    DynamicSimulation,
    DynamicSecurityAnalysis,
    ShortCircuit,
    OneBusShortCircuit,
    StateEstimation,
}

/// What a terminal event does to the stored result slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPolicy {
    /// Forget the result id, the slot becomes empty
    Clear,
    /// Keep the result id, the remote engine still serves its status
    Retain,
}

#[derive(Debug)]
pub struct ComputationDescriptor {
    pub path_segment: &'static str,
    pub bus_prefix: &'static str,
    pub notification_prefix: &'static str,
    pub not_runnable_code: &'static str,
    pub security_nodes_only: bool,
    pub on_stop: SlotPolicy,
    pub on_failure: SlotPolicy,
}

const LOAD_FLOW: ComputationDescriptor = ComputationDescriptor {
    path_segment: "loadflow",
    bus_prefix: "loadflow",
    notification_prefix: "loadflow",
    not_runnable_code: "LOADFLOW_NOT_RUNNABLE",
    security_nodes_only: false,
    on_stop: SlotPolicy::Clear,
    on_failure: SlotPolicy::Clear,
};

const SECURITY_ANALYSIS: ComputationDescriptor = ComputationDescriptor {
    path_segment: "security-analysis",
    bus_prefix: "sa",
    notification_prefix: "securityAnalysis",
    not_runnable_code: "SECURITY_ANALYSIS_NOT_RUNNABLE",
    security_nodes_only: false,
    on_stop: SlotPolicy::Clear,
    on_failure: SlotPolicy::Clear,
};

const SENSITIVITY_ANALYSIS: ComputationDescriptor = ComputationDescriptor {
    path_segment: "sensitivity-analysis",
    bus_prefix: "sensitivityanalysis",
    notification_prefix: "sensitivityAnalysis",
    not_runnable_code: "SENSITIVITY_ANALYSIS_NOT_RUNNABLE",
    security_nodes_only: false,
    on_stop: SlotPolicy::Clear,
    on_failure: SlotPolicy::Clear,
};

const NON_EVACUATED_ENERGY: ComputationDescriptor = ComputationDescriptor {
    path_segment: "non-evacuated-energy",
    bus_prefix: "nonevacuatedenergy",
    notification_prefix: "nonEvacuatedEnergy",
    not_runnable_code: "NON_EVACUATED_ENERGY_NOT_RUNNABLE",
    security_nodes_only: false,
    on_stop: SlotPolicy::Clear,
    on_failure: SlotPolicy::Clear,
};

// The voltage initialization engine stores failed runs with their status, so
// the id stays queryable after a failure.
const VOLTAGE_INITIALIZATION: ComputationDescriptor = ComputationDescriptor {
    path_segment: "voltage-init",
    bus_prefix: "voltageinit",
    notification_prefix: "voltageInit",
    not_runnable_code: "VOLTAGE_INIT_NOT_RUNNABLE",
    security_nodes_only: false,
    on_stop: SlotPolicy::Clear,
    on_failure: SlotPolicy::Retain,
};

const DYNAMIC_SIMULATION: ComputationDescriptor = ComputationDescriptor {
    path_segment: "dynamic-simulation",
    bus_prefix: "ds",
    notification_prefix: "dynamicSimulation",
    not_runnable_code: "DYNAMIC_SIMULATION_NOT_RUNNABLE",
    security_nodes_only: false,
    on_stop: SlotPolicy::Retain,
    on_failure: SlotPolicy::Retain,
};

const DYNAMIC_SECURITY_ANALYSIS: ComputationDescriptor = ComputationDescriptor {
    path_segment: "dynamic-security-analysis",
    bus_prefix: "dsa",
    notification_prefix: "dynamicSecurityAnalysis",
    not_runnable_code: "DYNAMIC_SECURITY_ANALYSIS_NOT_RUNNABLE",
    security_nodes_only: true,
    on_stop: SlotPolicy::Retain,
    on_failure: SlotPolicy::Retain,
};

const SHORT_CIRCUIT: ComputationDescriptor = ComputationDescriptor {
    path_segment: "short-circuit",
    bus_prefix: "shortcircuitanalysis",
    notification_prefix: "shortCircuitAnalysis",
    not_runnable_code: "SHORT_CIRCUIT_ANALYSIS_NOT_RUNNABLE",
    security_nodes_only: false,
    on_stop: SlotPolicy::Clear,
    on_failure: SlotPolicy::Clear,
};

const ONE_BUS_SHORT_CIRCUIT: ComputationDescriptor = ComputationDescriptor {
    path_segment: "one-bus-short-circuit",
    bus_prefix: "onebusshortcircuitanalysis",
    notification_prefix: "oneBusShortCircuitAnalysis",
    not_runnable_code: "ONE_BUS_SHORT_CIRCUIT_ANALYSIS_NOT_RUNNABLE",
    security_nodes_only: false,
    on_stop: SlotPolicy::Clear,
    on_failure: SlotPolicy::Clear,
};

const STATE_ESTIMATION: ComputationDescriptor = ComputationDescriptor {
    path_segment: "state-estimation",
    bus_prefix: "stateestimation",
    notification_prefix: "stateEstimation",
    not_runnable_code: "STATE_ESTIMATION_NOT_RUNNABLE",
    security_nodes_only: false,
    on_stop: SlotPolicy::Clear,
    on_failure: SlotPolicy::Clear,
};

impl ComputationType {
    pub fn descriptor(self) -> &'static ComputationDescriptor {
        match self {
            ComputationType::LoadFlow => &LOAD_FLOW,
            ComputationType::SecurityAnalysis => &SECURITY_ANALYSIS,
            ComputationType::SensitivityAnalysis => &SENSITIVITY_ANALYSIS,
            ComputationType::NonEvacuatedEnergyAnalysis => &NON_EVACUATED_ENERGY,
            ComputationType::VoltageInitialization => &VOLTAGE_INITIALIZATION,
            ComputationType::DynamicSimulation => &DYNAMIC_SIMULATION,
            ComputationType::DynamicSecurityAnalysis => &DYNAMIC_SECURITY_ANALYSIS,
            ComputationType::ShortCircuit => &SHORT_CIRCUIT,
            ComputationType::OneBusShortCircuit => &ONE_BUS_SHORT_CIRCUIT,
            ComputationType::StateEstimation => &STATE_ESTIMATION,
        }
    }

    pub fn all() -> impl Iterator<Item = ComputationType> {
        ComputationType::iter()
    }

    /// Key of the engine section in the configuration, e.g. `load_flow`
    pub fn config_key(self) -> &'static str {
        self.into()
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Self::all().find(|t| t.descriptor().path_segment == segment)
    }

    /// Whether a run of this type may target the given node
    pub fn allowed_on(self, node: &Node) -> bool {
        if node.is_root() {
            return false;
        }
        if self.descriptor().security_nodes_only {
            return node.subtype == Some(NodeSubtype::Security);
        }
        true
    }
}

impl std::fmt::Display for ComputationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.descriptor().path_segment)
    }
}

/// Lifecycle position of a stored computation result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
    Stopped,
}

/// A result slot value: the remote result id and what we know of it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComputationRun {
    pub result_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<Uuid>,
    pub state: RunState,
}

impl ComputationRun {
    pub fn running(result_id: Uuid, report_id: Uuid) -> Self {
        Self {
            result_id,
            report_id: Some(report_id),
            state: RunState::Running,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == RunState::Running
    }
}
