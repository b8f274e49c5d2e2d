//! Transaction coordinator for the save pipeline
//!
//! `save_changes` turns a pair of graphs into per-subject document writes:
//!
//! ```text
//! 1. Diff old/new graphs; empty diff returns immediately
//! 2. Read pre-images fresh from the store, append a pending record
//! 3. Lock every affected subject (fail fast, all or nothing)
//! 4. Re-read each document; it must still match the caller's old graph
//!    and the pre-image version
//! 5. Merge changes, bump versions, check cardinality (all subjects)
//! 6. Persist each document, or delete it if it is now empty
//! 7. Complete the record with post-images, release locks
//! 8. Hand changed subjects to the commit hook
//! ```
//!
//! Any failure in steps 3-6 releases the locks taken, marks the record
//! failed with the reason and a stack trace, and returns the error. Writes
//! already persisted for other subjects are not rolled back; replay from
//! the log is the recovery path.
//!
//! Regeneration runs in the commit hook after locks are released and can
//! never fail the write: hook errors are logged and returned in
//! `SaveOutcome::regeneration_errors`.
//!
//! # Memory Ordering
//!
//! The metric counters use Relaxed ordering: they are observational only
//! and synchronize nothing else.

use crate::cardinality::CardinalityRules;
use crate::lock_manager::LockManager;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tripod_core::{
    Bdd, ChangedSubjects, Changeset, DocumentStore, Error, Graph, ReadPreference,
    ReadPreferenceGuard, Result, Snapshot, SubjectChanges, SubjectId, Timestamp, TransactionId,
};
use tripod_durability::{TransactionError, TransactionLog, TransactionRecord};

/// Work to run once a transaction has committed
pub trait CommitHook: Send + Sync {
    /// React to committed changes; returns error messages to report
    fn after_commit(&self, changed: &ChangedSubjects, context: &str) -> Vec<String>;
}

/// Result of a successful `save_changes`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Logged transaction, `None` when there was nothing to save
    pub transaction_id: Option<TransactionId>,
    /// Changed predicates per subject; empty set for deletions
    pub changed_subjects: ChangedSubjects,
    /// New version per subject, `None` when the document was deleted
    pub versions: BTreeMap<SubjectId, Option<u64>>,
    /// Errors raised by post-commit regeneration
    pub regeneration_errors: Vec<String>,
}

impl SaveOutcome {
    /// True when the call saved nothing
    pub fn is_noop(&self) -> bool {
        self.transaction_id.is_none()
    }
}

/// Documents produced by a locked write
struct Committed {
    new_bdds: Vec<Snapshot>,
    changed: ChangedSubjects,
    versions: BTreeMap<SubjectId, Option<u64>>,
}

/// Orchestrates `save_changes` over a store, a lock manager and a log
pub struct TransactionCoordinator {
    store: Arc<dyn DocumentStore>,
    locks: Arc<dyn LockManager>,
    log: Arc<dyn TransactionLog>,
    cardinality: CardinalityRules,
    hook: Option<Arc<dyn CommitHook>>,
    active_count: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
}

impl TransactionCoordinator {
    /// Create a coordinator with no cardinality rules and no hook
    pub fn new(
        store: Arc<dyn DocumentStore>,
        locks: Arc<dyn LockManager>,
        log: Arc<dyn TransactionLog>,
    ) -> Self {
        Self {
            store,
            locks,
            log,
            cardinality: CardinalityRules::default(),
            hook: None,
            active_count: AtomicU64::new(0),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
        }
    }

    /// Enforce `rules` on every merged document
    pub fn with_cardinality(mut self, rules: CardinalityRules) -> Self {
        self.cardinality = rules;
        self
    }

    /// Run `hook` after every commit
    pub fn with_hook(mut self, hook: Arc<dyn CommitHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// The document store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The lock manager
    pub fn lock_manager(&self) -> &Arc<dyn LockManager> {
        &self.locks
    }

    /// The transaction log
    pub fn log(&self) -> &Arc<dyn TransactionLog> {
        &self.log
    }

    /// Save the difference between `old` and `new` in `context`
    pub fn save_changes(
        &self,
        old: &Graph,
        new: &Graph,
        context: &str,
        description: Option<&str>,
    ) -> Result<SaveOutcome> {
        let _primary = ReadPreferenceGuard::force(self.store.as_ref(), ReadPreference::Primary);

        let changeset = Changeset::compute(old, new);
        if changeset.is_empty() {
            debug!(target: "tripod::txn", context, "Nothing to save");
            return Ok(SaveOutcome::default());
        }

        let subjects: Vec<SubjectId> = changeset
            .subjects()
            .map(|resource| SubjectId::new(resource, context))
            .collect();
        let mut originals = Vec::with_capacity(subjects.len());
        for id in &subjects {
            originals.push(Snapshot::from_option(id.clone(), self.store.get_bdd(id)?));
        }

        let mut record = TransactionRecord::pending(
            TransactionId::new(),
            context,
            description.map(str::to_string),
            changeset,
            originals,
            Timestamp::now(),
        );
        self.log.append(&record)?;
        self.record_start();
        debug!(target: "tripod::txn", txn_id = %record.id, subjects = subjects.len(), "Transaction started");

        let committed = match self.locked_write(&record, old, &subjects) {
            Ok(committed) => committed,
            Err(e) => {
                record.fail(TransactionError::capture(e.to_string()), Timestamp::now());
                if let Err(log_err) = self.log.update(&record) {
                    error!(target: "tripod::txn", txn_id = %record.id, error = %log_err, "Failed to record aborted transaction");
                }
                self.record_abort();
                warn!(target: "tripod::txn", txn_id = %record.id, error = %e, "Transaction aborted");
                return Err(e);
            }
        };

        record.complete(committed.new_bdds, Timestamp::now());
        self.log.update(&record)?;
        self.record_commit();
        info!(target: "tripod::txn", txn_id = %record.id, subjects = subjects.len(), "Transaction committed");

        let regeneration_errors = match &self.hook {
            Some(hook) => hook.after_commit(&committed.changed, context),
            None => Vec::new(),
        };
        for message in &regeneration_errors {
            warn!(target: "tripod::txn", txn_id = %record.id, error = %message, "Regeneration failed after commit");
        }

        Ok(SaveOutcome {
            transaction_id: Some(record.id),
            changed_subjects: committed.changed,
            versions: committed.versions,
            regeneration_errors,
        })
    }

    /// Steps 3-6: lock, verify, merge, persist, unlock
    fn locked_write(
        &self,
        record: &TransactionRecord,
        old: &Graph,
        subjects: &[SubjectId],
    ) -> Result<Committed> {
        self.locks.acquire(subjects, record.id)?;
        let outcome = self.write_documents(record, old);
        if let Err(e) = self.locks.release(subjects) {
            error!(target: "tripod::txn", txn_id = %record.id, error = %e, "Failed to release locks");
        }
        outcome
    }

    fn write_documents(&self, record: &TransactionRecord, old: &Graph) -> Result<Committed> {
        let now = Timestamp::now();
        let mut revisions: Vec<(Bdd, &SubjectChanges)> = Vec::new();

        for original in &record.original_bdds {
            let id = &original.id;
            let current = self.store.get_bdd(id)?;
            verify_unchanged(id, original, current.as_ref(), old)?;

            let changes = record
                .changes
                .get(&id.resource)
                .ok_or_else(|| Error::NotFound(format!("changes for {}", id)))?;
            let revision = Bdd::next_revision(id.clone(), current.as_ref(), changes, now);
            self.cardinality.check(&revision)?;
            revisions.push((revision, changes));
        }

        let mut committed = Committed {
            new_bdds: Vec::with_capacity(revisions.len()),
            changed: ChangedSubjects::new(),
            versions: BTreeMap::new(),
        };
        for (revision, changes) in revisions {
            let id = revision.id.clone();
            if revision.is_empty() {
                self.store.delete_bdd(&id)?;
                committed.changed.insert_deleted(id.clone());
                committed.versions.insert(id.clone(), None);
                committed.new_bdds.push(Snapshot::absent(id));
            } else {
                committed.changed.insert(id.clone(), changes.predicates());
                committed.versions.insert(id, Some(revision.version));
                self.store.put_bdd(revision.clone())?;
                committed.new_bdds.push(Snapshot::of(revision));
            }
        }
        Ok(committed)
    }

    /// Record transaction start
    pub fn record_start(&self) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record transaction commit
    pub fn record_commit(&self) {
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record transaction abort
    pub fn record_abort(&self) {
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get transaction metrics
    pub fn metrics(&self) -> TransactionMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);

        TransactionMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}

/// The stored document must still be the one the caller diffed against
fn verify_unchanged(
    id: &SubjectId,
    original: &Snapshot,
    current: Option<&Bdd>,
    old: &Graph,
) -> Result<()> {
    let current_version = current.map(|bdd| bdd.version);
    if current_version != original.version() {
        return Err(Error::WriteConflict {
            subject: id.clone(),
            reason: format!(
                "version {:?} no longer matches {:?}",
                current_version,
                original.version()
            ),
        });
    }

    let stored = current
        .map(|bdd| bdd.to_graph().subject_triples(&id.resource))
        .unwrap_or_default();
    if stored != old.subject_triples(&id.resource) {
        return Err(Error::WriteConflict {
            subject: id.clone(),
            reason: "stored triples differ from the old graph".to_string(),
        });
    }
    Ok(())
}

/// Transaction metrics
#[derive(Debug, Clone)]
pub struct TransactionMetrics {
    /// Number of currently active transactions
    pub active_count: u64,
    /// Total number of transactions started
    pub total_started: u64,
    /// Total number of transactions committed
    pub total_committed: u64,
    /// Total number of transactions aborted
    pub total_aborted: u64,
    /// Commit success rate (committed / started)
    pub commit_rate: f64,
}

impl TransactionMetrics {
    /// Total transactions that completed (committed + aborted)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// Abort rate (aborted / started)
    pub fn abort_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_aborted as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}
