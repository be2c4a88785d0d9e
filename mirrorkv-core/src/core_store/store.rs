/*
    store.rs - Timestamp-ordered key-value store

    Last-writer-wins map from key to (value, timestamp). Every accepted
    mutation refreshes the attached index before the store lock is
    released, so no observer can read a store state the index has not
    caught up with.

    Lock ordering: the store mutex is acquired first, the index's
    interior lock second (inside rebuild). The index never calls back
    into the store.
*/

use crate::core_index::Index;
use crate::core_store::entry::{Entry, Timestamp};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Debug, Clone)]
struct Stored {
    value: String,
    timestamp: Timestamp,
}

/// Replicated LWW key-value store.
///
/// The map is ordered by key so that snapshots (and therefore index leaf
/// ordinals) are reproducible across peers holding the same logical state.
pub struct KvStore {
    entries: Mutex<BTreeMap<String, Stored>>,
    index: Arc<dyn Index>,
}

impl KvStore {
    /// Create a store observed by `index`. The index is rebuilt once so
    /// it agrees with the (empty) initial state.
    pub fn new(index: Arc<dyn Index>) -> Self {
        index.rebuild(&[]);
        KvStore {
            entries: Mutex::new(BTreeMap::new()),
            index,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Stored>> {
        // A poisoned lock means a panic mid-mutation; propagating the
        // guard keeps readers consistent with whatever was committed.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored value for `key`, or the empty string if absent.
    pub fn get(&self, key: &str) -> String {
        self.lock()
            .get(key)
            .map(|s| s.value.clone())
            .unwrap_or_default()
    }

    /// Stored (value, timestamp) for `key`, if present.
    pub fn value_with_timestamp(&self, key: &str) -> Option<(String, Timestamp)> {
        self.lock()
            .get(key)
            .map(|s| (s.value.clone(), s.timestamp))
    }

    /// Install `key = value` at `timestamp`.
    ///
    /// Accepted iff the key is absent or `timestamp` is not older than
    /// the stored one. Ties accept the incoming write, which makes
    /// re-delivery of the same replicated write idempotent.
    pub fn set(&self, key: &str, value: &str, timestamp: Timestamp) -> bool {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(key) {
            if timestamp < existing.timestamp {
                trace!(key, %timestamp, stored = %existing.timestamp, "rejected stale set");
                return false;
            }
        }
        entries.insert(
            key.to_string(),
            Stored {
                value: value.to_string(),
                timestamp,
            },
        );
        self.refresh_index(&entries);
        true
    }

    /// Remove `key` if it exists and `timestamp` is not older than the
    /// stored one.
    pub fn del(&self, key: &str, timestamp: Timestamp) -> bool {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(existing) if timestamp >= existing.timestamp => {
                entries.remove(key);
                self.refresh_index(&entries);
                true
            }
            Some(existing) => {
                trace!(key, %timestamp, stored = %existing.timestamp, "rejected stale del");
                false
            }
            None => false,
        }
    }

    /// Point-in-time copy of every entry, ascending by key.
    pub fn snapshot(&self) -> Vec<Entry> {
        Self::snapshot_locked(&self.lock())
    }

    /// (key, timestamp) projection of `snapshot`, ascending by key.
    pub fn keys_with_timestamps(&self) -> Vec<(String, Timestamp)> {
        self.lock()
            .iter()
            .map(|(k, s)| (k.clone(), s.timestamp))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn snapshot_locked(entries: &BTreeMap<String, Stored>) -> Vec<Entry> {
        entries
            .iter()
            .map(|(k, s)| Entry::new(k.clone(), s.value.clone(), s.timestamp))
            .collect()
    }

    // Runs inside the store's critical section.
    fn refresh_index(&self, entries: &BTreeMap<String, Stored>) {
        self.index.rebuild(&Self::snapshot_locked(entries));
    }
}
