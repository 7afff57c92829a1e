use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::{ComputationType, StudyId};

/// Computation parameters chosen per study, passed verbatim to the engines
#[derive(Default)]
pub struct ParameterStore {
    values: RwLock<HashMap<(StudyId, ComputationType), Value>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, study_id: StudyId, computation: ComputationType) -> Option<Value> {
        self.values.read().get(&(study_id, computation)).cloned()
    }

    /// Stores parameters, returning true when they differ from the previous ones
    pub fn set(&self, study_id: StudyId, computation: ComputationType, parameters: Value) -> bool {
        let previous = self
            .values
            .write()
            .insert((study_id, computation), parameters.clone());
        previous.as_ref() != Some(&parameters)
    }
}
