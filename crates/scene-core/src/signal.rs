//! Signals and the current-value lookup contract

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Value;

/// A single observation of one external measurement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub key: String,
    pub value: Value,
}

impl Signal {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Signal {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Read side of the signal table
///
/// Conditions are always evaluated against the latest value a source holds,
/// never against the payload of the event that triggered the evaluation.
pub trait SignalSource: Send + Sync {
    fn current_value(&self, key: &str) -> Option<Value>;
}

impl SignalSource for HashMap<String, Value> {
    fn current_value(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}
