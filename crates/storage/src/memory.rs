//! In-memory document store
//!
//! # Design
//!
//! - Descriptions and locks live in DashMaps: per-key operations are atomic
//!   and only lock the target shard.
//! - Lock insertion uses the DashMap entry API, giving the insert-if-absent
//!   primitive the lock manager relies on.
//! - Materialized documents and their impact, root and expiry indexes sit
//!   behind one RwLock so a document and its index entries always change
//!   together.
//! - Read routing counts open forcing scopes, so overlapping writers put the
//!   configured preference back only when the last of them finishes.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::{debug, warn};
use tripod_core::{
    AuditRecord, Bdd, DocumentStore, Freshness, LockRecord, MaterializedDocument,
    MaterializedKey, Operation, ReadPreference, Result, SubjectId, Timestamp,
};

use crate::index::{ImpactIndex, MaterializedEntry, RootIndex, TypeIndex};
use crate::ttl::ExpiryIndex;

#[derive(Debug, Default)]
struct MaterializedCollections {
    docs: HashMap<MaterializedEntry, MaterializedDocument>,
    impact: ImpactIndex,
    roots: RootIndex,
    expiry: ExpiryIndex,
}

impl MaterializedCollections {
    fn unindex(&mut self, entry: &MaterializedEntry, doc: &MaterializedDocument) {
        match &doc.freshness {
            Freshness::ImpactIndex(subjects) => self.impact.remove_all(subjects, entry),
            Freshness::Expires(at) => self.expiry.remove(*at, entry),
        }
        self.roots.remove(entry.0, &entry.1);
    }

    fn index(&mut self, entry: &MaterializedEntry, doc: &MaterializedDocument) {
        match &doc.freshness {
            Freshness::ImpactIndex(subjects) => self.impact.insert_all(subjects, entry),
            Freshness::Expires(at) => self.expiry.insert(*at, entry.clone()),
        }
        self.roots.insert(entry.0, entry.1.clone());
    }

    fn remove(&mut self, entry: &MaterializedEntry) -> bool {
        match self.docs.remove(entry) {
            Some(doc) => {
                self.unindex(entry, &doc);
                true
            }
            None => false,
        }
    }
}

/// Configured read preference plus the open forcing scopes
#[derive(Debug, Default)]
struct ReadRouting {
    configured: ReadPreference,
    forced: Option<ReadPreference>,
    scopes: usize,
}

/// Document store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    bdds: DashMap<SubjectId, Bdd>,
    types: RwLock<TypeIndex>,
    locks: DashMap<SubjectId, LockRecord>,
    audit: RwLock<Vec<AuditRecord>>,
    materialized: RwLock<MaterializedCollections>,
    read_routing: Mutex<ReadRouting>,
}

impl MemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored descriptions
    pub fn bdd_count(&self) -> usize {
        self.bdds.len()
    }

    /// Every stored description, ordered by subject
    pub fn all_bdds(&self) -> Vec<Bdd> {
        let mut all: Vec<Bdd> = self.bdds.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Number of materialized documents in one collection
    pub fn materialized_count(&self, operation: Operation) -> usize {
        self.materialized
            .read()
            .docs
            .keys()
            .filter(|(op, _)| *op == operation)
            .count()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get_bdd(&self, id: &SubjectId) -> Result<Option<Bdd>> {
        Ok(self.bdds.get(id).map(|e| e.value().clone()))
    }

    fn put_bdd(&self, bdd: Bdd) -> Result<()> {
        let mut types = self.types.write();
        let new_types: Vec<String> = bdd.types().map(str::to_string).collect();
        let id = bdd.id.clone();
        if let Some(previous) = self.bdds.insert(id.clone(), bdd) {
            for t in previous.types() {
                types.remove(t, &id);
            }
        }
        for t in &new_types {
            types.insert(t, id.clone());
        }
        Ok(())
    }

    fn delete_bdd(&self, id: &SubjectId) -> Result<bool> {
        let mut types = self.types.write();
        match self.bdds.remove(id) {
            Some((_, previous)) => {
                for t in previous.types() {
                    types.remove(t, id);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn subjects_of_type(&self, rdf_type: &str, context: &str) -> Result<Vec<SubjectId>> {
        let types = self.types.read();
        let mut subjects: Vec<SubjectId> = types
            .get(rdf_type, context)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        subjects.sort();
        Ok(subjects)
    }

    fn subjects_referencing(
        &self,
        predicate: &str,
        target: &SubjectId,
    ) -> Result<Vec<SubjectId>> {
        let mut subjects: Vec<SubjectId> = self
            .bdds
            .iter()
            .filter(|e| {
                let bdd = e.value();
                bdd.id.context == target.context
                    && bdd
                        .values(predicate)
                        .iter()
                        .any(|o| o.as_uri() == Some(target.resource.as_str()))
            })
            .map(|e| e.key().clone())
            .collect();
        subjects.sort();
        Ok(subjects)
    }

    fn insert_lock_if_absent(&self, lock: LockRecord) -> Result<bool> {
        match self.locks.entry(lock.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(lock);
                Ok(true)
            }
        }
    }

    fn delete_lock(&self, id: &SubjectId) -> Result<bool> {
        Ok(self.locks.remove(id).is_some())
    }

    fn locks(&self) -> Result<Vec<LockRecord>> {
        let mut locks: Vec<LockRecord> = self.locks.iter().map(|e| e.value().clone()).collect();
        locks.sort_by(|a, b| a.locked_at.cmp(&b.locked_at).then_with(|| a.id.cmp(&b.id)));
        Ok(locks)
    }

    fn put_audit(&self, record: AuditRecord) -> Result<()> {
        let mut audit = self.audit.write();
        match audit.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => audit.push(record),
        }
        Ok(())
    }

    fn audit_records(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.audit.read().clone())
    }

    fn get_materialized(
        &self,
        operation: Operation,
        key: &MaterializedKey,
    ) -> Result<Option<MaterializedDocument>> {
        Ok(self
            .materialized
            .read()
            .docs
            .get(&(operation, key.clone()))
            .cloned())
    }

    fn put_materialized(&self, operation: Operation, doc: MaterializedDocument) -> Result<()> {
        let entry = (operation, doc.key.clone());
        let mut collections = self.materialized.write();
        collections.remove(&entry);
        collections.index(&entry, &doc);
        collections.docs.insert(entry, doc);
        Ok(())
    }

    fn delete_materialized(&self, operation: Operation, key: &MaterializedKey) -> Result<bool> {
        Ok(self.materialized.write().remove(&(operation, key.clone())))
    }

    fn find_by_impact(
        &self,
        operation: Operation,
        subject: &SubjectId,
    ) -> Result<Vec<MaterializedKey>> {
        Ok(self.materialized.read().impact.lookup(operation, subject))
    }

    fn find_by_root(
        &self,
        operation: Operation,
        subject: &SubjectId,
    ) -> Result<Vec<MaterializedKey>> {
        Ok(self.materialized.read().roots.lookup(operation, subject))
    }

    fn purge_expired(&self, now: Timestamp) -> Result<usize> {
        let mut collections = self.materialized.write();
        let expired = collections.expiry.find_expired(now);
        let mut purged = 0;
        for entry in expired {
            if collections.remove(&entry) {
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(target: "tripod::storage", purged, "Purged expired composites");
        }
        Ok(purged)
    }

    fn read_preference(&self) -> ReadPreference {
        let routing = self.read_routing.lock();
        routing.forced.unwrap_or(routing.configured)
    }

    fn set_read_preference(&self, preference: ReadPreference) {
        self.read_routing.lock().configured = preference;
    }

    fn push_read_preference(&self, preference: ReadPreference) {
        let mut routing = self.read_routing.lock();
        routing.forced = Some(preference);
        routing.scopes += 1;
    }

    fn pop_read_preference(&self) {
        let mut routing = self.read_routing.lock();
        match routing.scopes {
            0 => warn!(target: "tripod::storage", "Read preference scope closed twice"),
            1 => {
                routing.scopes = 0;
                routing.forced = None;
            }
            _ => routing.scopes -= 1,
        }
    }
}
