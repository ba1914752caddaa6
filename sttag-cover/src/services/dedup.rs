//! Per-run set of claimed group keys
//!
//! At most one work item per key gets past [`DedupSet::claim`] in a run.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct DedupSet {
    keys: Mutex<HashSet<String>>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check-and-insert `key`
    ///
    /// Returns `true` for the first claimant only. Keys compare exactly.
    pub fn claim(&self, key: &str) -> bool {
        self.lock().insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // A panic while holding the lock cannot leave the set half-updated.
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
