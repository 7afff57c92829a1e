//! In-process message bus.
//!
//! Every inbound destination gets a bounded mpsc channel. Producers (the bus
//! ingress endpoint, tests) publish by destination name; the consumer side takes
//! each receiver exactly once and drives it from its own task.

use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::consumer::{BusMessage, Destination};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("unknown destination {0}")]
    UnknownDestination(String),

    #[error("destination {0} has no consumer")]
    Closed(String),
}

pub struct MessageHub {
    senders: HashMap<Destination, mpsc::Sender<BusMessage>>,
    receivers: Mutex<HashMap<Destination, mpsc::Receiver<BusMessage>>>,
}

impl MessageHub {
    pub fn new(capacity: usize) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for destination in Destination::all() {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.insert(destination, tx);
            receivers.insert(destination, rx);
        }
        Self {
            senders,
            receivers: Mutex::new(receivers),
        }
    }

    pub async fn publish(&self, destination: &str, message: BusMessage) -> Result<(), BusError> {
        let parsed = Destination::parse(destination)
            .ok_or_else(|| BusError::UnknownDestination(destination.to_string()))?;
        let sender = self
            .senders
            .get(&parsed)
            .ok_or_else(|| BusError::UnknownDestination(destination.to_string()))?;
        debug!(destination = %parsed, "bus message enqueued");
        sender
            .send(message)
            .await
            .map_err(|_| BusError::Closed(destination.to_string()))
    }

    /// Hands out every receiver not taken yet
    pub fn take_receivers(&self) -> Vec<(Destination, mpsc::Receiver<BusMessage>)> {
        self.receivers.lock().drain().collect()
    }
}
