//! Expiry index for TTL composites
//!
//! Maps expiry timestamp → documents using a BTreeMap so that finding
//! every expired document is a range query, O(expired count) instead of
//! O(total documents).

use crate::index::MaterializedEntry;
use std::collections::{BTreeMap, HashSet};
use tripod_core::Timestamp;

/// Expiry index: timestamp → materialized documents expiring then
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    index: BTreeMap<Timestamp, HashSet<MaterializedEntry>>,
}

impl ExpiryIndex {
    /// Create a new empty ExpiryIndex
    pub fn new() -> Self {
        Self {
            index: BTreeMap::new(),
        }
    }

    /// Register a document expiring at `expires`
    pub fn insert(&mut self, expires: Timestamp, entry: MaterializedEntry) {
        self.index.entry(expires).or_default().insert(entry);
    }

    /// Unregister a document.
    ///
    /// Used when a document is deleted or regenerated with a new expiry.
    pub fn remove(&mut self, expires: Timestamp, entry: &MaterializedEntry) {
        if let Some(entries) = self.index.get_mut(&expires) {
            entries.remove(entry);
            if entries.is_empty() {
                self.index.remove(&expires);
            }
        }
    }

    /// Every document whose expiry is at or before `now`
    pub fn find_expired(&self, now: Timestamp) -> Vec<MaterializedEntry> {
        self.index
            .range(..=now)
            .flat_map(|(_, entries)| entries.iter().cloned())
            .collect()
    }

    /// Total number of registered documents
    pub fn len(&self) -> usize {
        self.index.values().map(HashSet::len).sum()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
