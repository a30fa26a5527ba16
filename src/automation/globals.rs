//! Key/value store shared by every script session of an engine.

use super::types::ScriptValue;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Cheap to clone; clones share the same map. Last writer wins.
#[derive(Debug, Clone, Default)]
pub struct GlobalStateStore {
    values: Arc<RwLock<HashMap<String, ScriptValue>>>,
}

impl GlobalStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: ScriptValue) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<ScriptValue> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn remove(&self, key: &str) -> Option<ScriptValue> {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
