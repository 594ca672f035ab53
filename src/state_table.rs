//! Concurrent per-key state table.
//!
//! Message handlers look up or create the state for a key and hold a cloned
//! `Arc` handle for the duration of the call; distinct keys land on distinct
//! shards and do not contend. Collection is cooperative: `release_if` removes
//! an entry only when the caller-supplied check passes and the table holds
//! the last reference, so a handle obtained by a concurrent handler always
//! stays valid and a collected key is simply recreated on its next use.

use std::sync::Arc;

use dashmap::DashMap;

pub struct StateTable<V> {
    entries: DashMap<Vec<u8>, Arc<V>>,
}

impl<V> StateTable<V> {
    pub fn new() -> StateTable<V> {
        StateTable {
            entries: DashMap::new(),
        }
    }

    /// Returns the state for `key`, creating it with `init` on first use.
    pub fn get_or_create<F>(&self, key: &[u8], init: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        if let Some(entry) = self.entries.get(key) {
            return entry.value().clone();
        }
        self.entries
            .entry(key.to_vec())
            .or_insert_with(|| Arc::new(init()))
            .value()
            .clone()
    }

    /// Drops the entry for `key` if `idle` approves and nobody else holds a
    /// handle. Returns whether the entry was removed.
    pub fn release_if<F>(&self, key: &[u8], idle: F) -> bool
    where
        F: Fn(&V) -> bool,
    {
        self.entries
            .remove_if(key, |_, v| Arc::strong_count(v) == 1 && idle(v.as_ref()))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for StateTable<V> {
    fn default() -> StateTable<V> {
        StateTable::new()
    }
}
