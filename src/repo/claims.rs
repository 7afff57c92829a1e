use parking_lot::Mutex;
use std::collections::HashSet;

use crate::domain::{ComputationType, NodeId, RootNetworkId};

pub type ClaimKey = (NodeId, RootNetworkId, ComputationType);

/// Keys with a run request in flight
#[derive(Default)]
pub struct RunClaims(Mutex<HashSet<ClaimKey>>);

/// Held for the duration of one run request; releases the key on drop
pub struct RunClaim<'a> {
    claims: &'a RunClaims,
    key: ClaimKey,
}

impl RunClaims {
    pub fn claim(&self, key: ClaimKey) -> Option<RunClaim<'_>> {
        self.0.lock().insert(key).then_some(RunClaim { claims: self, key })
    }

    pub fn is_held(&self, key: ClaimKey) -> bool {
        self.0.lock().contains(&key)
    }
}

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        self.claims.0.lock().remove(&self.key);
    }
}
