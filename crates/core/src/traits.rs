//! Document store abstraction
//!
//! The `DocumentStore` trait is the only way upper layers touch persisted
//! data. Implementations provide per-document atomicity; nothing here
//! promises atomicity across documents.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (requires Send + Sync).

use crate::document::Bdd;
use crate::error::Result;
use crate::lock::{AuditRecord, LockRecord};
use crate::materialized::{MaterializedDocument, MaterializedKey};
use crate::timestamp::Timestamp;
use crate::types::{Operation, SubjectId};

/// Replica read routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPreference {
    /// Strongly consistent reads from the primary
    Primary,
    /// Primary when available
    #[default]
    PrimaryPreferred,
    /// Possibly stale replica reads
    Secondary,
    /// Lowest-latency member
    Nearest,
}

/// Persistence adapter for descriptions, locks and materialized documents
pub trait DocumentStore: Send + Sync {
    // ------------------------------------------------------------------
    // Bounded descriptions
    // ------------------------------------------------------------------

    /// Read one description
    fn get_bdd(&self, id: &SubjectId) -> Result<Option<Bdd>>;

    /// Replace (or create) a description wholesale
    fn put_bdd(&self, bdd: Bdd) -> Result<()>;

    /// Delete a description. Returns false if it did not exist.
    fn delete_bdd(&self, id: &SubjectId) -> Result<bool>;

    /// Subjects in `context` whose `rdf:type` includes `rdf_type`
    fn subjects_of_type(&self, rdf_type: &str, context: &str) -> Result<Vec<SubjectId>>;

    /// Subjects in `target`'s context with a `predicate` value pointing at
    /// `target`
    fn subjects_referencing(&self, predicate: &str, target: &SubjectId)
        -> Result<Vec<SubjectId>>;

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    /// Insert a lock unless one exists for the subject.
    ///
    /// Must be atomic: of two concurrent callers for the same subject,
    /// exactly one sees `Ok(true)`.
    fn insert_lock_if_absent(&self, lock: LockRecord) -> Result<bool>;

    /// Delete a lock. Returns false if there was none.
    fn delete_lock(&self, id: &SubjectId) -> Result<bool>;

    /// Every lock currently held
    fn locks(&self) -> Result<Vec<LockRecord>>;

    // ------------------------------------------------------------------
    // Audit trail
    // ------------------------------------------------------------------

    /// Insert or replace an audit record by id
    fn put_audit(&self, record: AuditRecord) -> Result<()>;

    /// All audit records, oldest first
    fn audit_records(&self) -> Result<Vec<AuditRecord>>;

    // ------------------------------------------------------------------
    // Materialized documents
    // ------------------------------------------------------------------

    /// Read one materialized document
    fn get_materialized(
        &self,
        operation: Operation,
        key: &MaterializedKey,
    ) -> Result<Option<MaterializedDocument>>;

    /// Replace (or create) a materialized document wholesale, updating
    /// the impact and expiry indexes
    fn put_materialized(&self, operation: Operation, doc: MaterializedDocument) -> Result<()>;

    /// Delete a materialized document. Returns false if it did not exist.
    fn delete_materialized(&self, operation: Operation, key: &MaterializedKey) -> Result<bool>;

    /// Documents whose impact index contains `subject`
    fn find_by_impact(&self, operation: Operation, subject: &SubjectId)
        -> Result<Vec<MaterializedKey>>;

    /// Documents rooted at `subject`, for any specification
    fn find_by_root(&self, operation: Operation, subject: &SubjectId)
        -> Result<Vec<MaterializedKey>>;

    /// Delete every TTL document expired at `now`; returns how many
    fn purge_expired(&self, now: Timestamp) -> Result<usize>;

    // ------------------------------------------------------------------
    // Read routing
    // ------------------------------------------------------------------

    /// Preference in effect: the forced one while any forcing scope is
    /// open, otherwise the configured one
    fn read_preference(&self) -> ReadPreference;

    /// Change the configured read preference. Open forcing scopes still
    /// take precedence until the last one ends.
    fn set_read_preference(&self, preference: ReadPreference);

    /// Open a scope forcing `preference`. Scopes may overlap across
    /// threads; the most recently opened preference is the one in effect.
    fn push_read_preference(&self, preference: ReadPreference);

    /// Close one forcing scope. Closing the last one brings back the
    /// configured preference.
    fn pop_read_preference(&self);
}

/// Forces a read preference for a scope, closing the scope on drop on every
/// exit path. Overlapping guards from concurrent writers are counted by the
/// store, so the configured preference returns only after the last drop.
pub struct ReadPreferenceGuard<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> ReadPreferenceGuard<'a> {
    /// Force `preference` on `store` until the guard is dropped
    pub fn force(store: &'a dyn DocumentStore, preference: ReadPreference) -> Self {
        store.push_read_preference(preference);
        ReadPreferenceGuard { store }
    }
}

impl Drop for ReadPreferenceGuard<'_> {
    fn drop(&mut self) {
        self.store.pop_read_preference();
    }
}
