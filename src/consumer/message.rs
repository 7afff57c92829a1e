use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{ComputationType, ReceiverToken};

pub const HEADER_RESULT_UUID: &str = "resultUuid";
pub const HEADER_RECEIVER: &str = "receiver";
pub const HEADER_MESSAGE: &str = "message";
pub const HEADER_USER_ID: &str = "userId";

/// One inbound event as delivered by the message bus
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BusMessage {
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub payload: Value,
}

impl BusMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `None` when absent or not a uuid
    pub fn result_uuid(&self) -> Option<Uuid> {
        self.header(HEADER_RESULT_UUID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    pub fn receiver(&self) -> Option<ReceiverToken> {
        self.header(HEADER_RECEIVER).and_then(ReceiverToken::decode)
    }

    pub fn message(&self) -> Option<&str> {
        self.header(HEADER_MESSAGE)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.header(HEADER_USER_ID)
    }
}

/// Terminal or informational event kinds emitted by computation engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Result,
    Stopped,
    Failed,
    CancelFailed,
    Debug,
}

impl Outcome {
    pub const ALL: [Outcome; 5] = [
        Outcome::Result,
        Outcome::Stopped,
        Outcome::Failed,
        Outcome::CancelFailed,
        Outcome::Debug,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Outcome::Result => "result",
            Outcome::Stopped => "stopped",
            Outcome::Failed => "run.dlx",
            Outcome::CancelFailed => "cancelfailed",
            Outcome::Debug => "debug",
        }
    }
}

/// Events emitted by the network builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildOutcome {
    Built,
    Failed,
    Stopped,
}

impl BuildOutcome {
    pub const ALL: [BuildOutcome; 3] = [BuildOutcome::Built, BuildOutcome::Failed, BuildOutcome::Stopped];

    pub fn destination(self) -> &'static str {
        match self {
            BuildOutcome::Built => "build.result",
            BuildOutcome::Failed => "build.failed",
            BuildOutcome::Stopped => "build.stopped",
        }
    }
}

/// An inbound destination, e.g. `sa.result` or `build.failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Computation(ComputationType, Outcome),
    Build(BuildOutcome),
}

impl Destination {
    pub fn all() -> Vec<Destination> {
        let mut all: Vec<Destination> = ComputationType::all()
            .flat_map(|t| Outcome::ALL.into_iter().map(move |o| Destination::Computation(t, o)))
            .collect();
        all.extend(BuildOutcome::ALL.into_iter().map(Destination::Build));
        all
    }

    pub fn name(&self) -> String {
        match self {
            Destination::Computation(t, outcome) => {
                format!("{}.{}", t.descriptor().bus_prefix, outcome.suffix())
            }
            Destination::Build(outcome) => outcome.destination().to_string(),
        }
    }

    pub fn parse(name: &str) -> Option<Destination> {
        if let Some(build) = BuildOutcome::ALL.into_iter().find(|o| o.destination() == name) {
            return Some(Destination::Build(build));
        }
        let (prefix, suffix) = name.split_once('.')?;
        let computation = ComputationType::all().find(|t| t.descriptor().bus_prefix == prefix)?;
        let outcome = Outcome::ALL.into_iter().find(|o| o.suffix() == suffix)?;
        Some(Destination::Computation(computation, outcome))
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}
