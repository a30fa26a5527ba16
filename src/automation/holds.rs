//! Pointers left down by `holdPress`, grouped by the key that pressed them.
//!
//! The press session and the release session of one key are different
//! sessions, so the leases outlive both and live here instead.

use crate::control::PointerLease;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct KeyHolds {
    by_key: Arc<Mutex<HashMap<u32, Vec<PointerLease>>>>,
}

impl KeyHolds {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<u32, Vec<PointerLease>>> {
        self.by_key.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, key_id: u32, lease: PointerLease) {
        self.map().entry(key_id).or_default().push(lease);
    }

    /// Most recent hold of `key_id`.
    pub fn pop(&self, key_id: u32) -> Option<PointerLease> {
        let mut map = self.map();
        let leases = map.get_mut(&key_id)?;
        let lease = leases.pop();
        if leases.is_empty() {
            map.remove(&key_id);
        }
        lease
    }

    pub fn take(&self, key_id: u32) -> Vec<PointerLease> {
        self.map().remove(&key_id).unwrap_or_default()
    }

    pub fn take_all(&self) -> Vec<PointerLease> {
        self.map().drain().flat_map(|(_, leases)| leases).collect()
    }

    pub fn count(&self, key_id: u32) -> usize {
        self.map().get(&key_id).map_or(0, Vec::len)
    }
}
