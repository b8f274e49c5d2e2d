//! Per-subject exclusive locks
//!
//! Locks are documents in the store's lock collection, created with the
//! store's atomic insert-if-absent. Acquisition is fail-fast: a subject that
//! is already locked fails the whole call immediately and every lock taken
//! earlier in the same call is released, so a caller never holds a partial
//! lock set.
//!
//! A lock that outlives its transaction (process died between acquire and
//! release) is "inert". `remove_inert_locks` clears them and leaves an audit
//! record behind.

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tripod_core::{
    AuditKind, AuditRecord, AuditStatus, DocumentStore, Error, LockRecord, Result, SubjectId,
    Timestamp, TransactionId,
};

/// Lock acquisition and cleanup
pub trait LockManager: Send + Sync {
    /// Lock every subject for `transaction_id`, or none of them.
    ///
    /// Fails with `Error::LockConflict` naming the first subject that was
    /// already locked.
    fn acquire(&self, subjects: &[SubjectId], transaction_id: TransactionId) -> Result<()>;

    /// Delete the locks on `subjects`; missing locks are ignored
    fn release(&self, subjects: &[SubjectId]) -> Result<()>;

    /// Locks currently held, optionally windowed by lock time
    fn list_locked(&self, from: Option<Timestamp>, till: Option<Timestamp>)
        -> Result<Vec<LockRecord>>;

    /// Force-delete every lock owned by `transaction_id`.
    ///
    /// Returns `Ok(false)` when the transaction owns no locks.
    fn remove_inert_locks(&self, transaction_id: TransactionId, reason: &str) -> Result<bool>;
}

/// Lock manager backed by the document store's lock collection
pub struct StoreLockManager {
    store: Arc<dyn DocumentStore>,
}

impl StoreLockManager {
    /// Create a lock manager over `store`
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        StoreLockManager { store }
    }

    fn release_quietly(&self, subjects: &[SubjectId]) {
        for subject in subjects {
            if let Err(e) = self.store.delete_lock(subject) {
                error!(target: "tripod::lock", subject = %subject, error = %e, "Failed to release lock");
            }
        }
    }

    fn delete_owned(&self, owned: &[LockRecord]) -> Result<()> {
        for lock in owned {
            self.store.delete_lock(&lock.id)?;
        }
        Ok(())
    }
}

impl LockManager for StoreLockManager {
    fn acquire(&self, subjects: &[SubjectId], transaction_id: TransactionId) -> Result<()> {
        let mut acquired: Vec<SubjectId> = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let lock = LockRecord {
                id: subject.clone(),
                locked_for_transaction: transaction_id,
                locked_at: Timestamp::now(),
            };
            match self.store.insert_lock_if_absent(lock) {
                Ok(true) => acquired.push(subject.clone()),
                Ok(false) => {
                    self.release_quietly(&acquired);
                    debug!(target: "tripod::lock", txn_id = %transaction_id, subject = %subject, "Lock already held");
                    return Err(Error::LockConflict {
                        subject: subject.clone(),
                    });
                }
                Err(e) => {
                    self.release_quietly(&acquired);
                    return Err(e);
                }
            }
        }
        debug!(target: "tripod::lock", txn_id = %transaction_id, count = acquired.len(), "Locks acquired");
        Ok(())
    }

    fn release(&self, subjects: &[SubjectId]) -> Result<()> {
        for subject in subjects {
            self.store.delete_lock(subject)?;
        }
        Ok(())
    }

    fn list_locked(
        &self,
        from: Option<Timestamp>,
        till: Option<Timestamp>,
    ) -> Result<Vec<LockRecord>> {
        Ok(self
            .store
            .locks()?
            .into_iter()
            .filter(|lock| lock.locked_at.within(from, till))
            .collect())
    }

    fn remove_inert_locks(&self, transaction_id: TransactionId, reason: &str) -> Result<bool> {
        let owned: Vec<LockRecord> = self
            .store
            .locks()?
            .into_iter()
            .filter(|lock| lock.locked_for_transaction == transaction_id)
            .collect();
        if owned.is_empty() {
            return Ok(false);
        }

        let mut audit = AuditRecord {
            id: TransactionId::new().to_string(),
            kind: AuditKind::RemoveInertLocks,
            transaction_id,
            reason: reason.to_string(),
            status: AuditStatus::InProgress,
            error: None,
            subjects: owned.iter().map(|lock| lock.id.clone()).collect(),
            started_at: Timestamp::now(),
            finished_at: None,
        };
        self.store.put_audit(audit.clone())?;

        match self.delete_owned(&owned) {
            Ok(()) => {
                audit.status = AuditStatus::Completed;
                audit.finished_at = Some(Timestamp::now());
                self.store.put_audit(audit)?;
                info!(target: "tripod::lock", txn_id = %transaction_id, count = owned.len(), reason, "Removed inert locks");
                Ok(true)
            }
            Err(e) => {
                audit.status = AuditStatus::Error;
                audit.error = Some(e.to_string());
                audit.finished_at = Some(Timestamp::now());
                if let Err(audit_err) = self.store.put_audit(audit) {
                    error!(target: "tripod::lock", error = %audit_err, "Failed to record audit failure");
                }
                warn!(target: "tripod::lock", txn_id = %transaction_id, error = %e, "Inert lock removal failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripod_core::ErrorKind;
    use tripod_storage::MemoryDocumentStore;

    fn subject(name: &str) -> SubjectId {
        SubjectId::new(format!("http://x/{}", name), "http://ctx")
    }

    fn manager() -> (Arc<MemoryDocumentStore>, StoreLockManager) {
        let store = Arc::new(MemoryDocumentStore::new());
        let manager = StoreLockManager::new(store.clone());
        (store, manager)
    }

    #[test]
    fn test_acquire_is_all_or_nothing() {
        let (store, manager) = manager();
        let holder = TransactionId::new();
        manager.acquire(&[subject("b")], holder).unwrap();

        let err = manager
            .acquire(&[subject("a"), subject("b"), subject("c")], TransactionId::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockConflict);

        let locks = store.locks().unwrap();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].locked_for_transaction, holder);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (_store, manager) = manager();
        let subjects = [subject("a")];
        manager.acquire(&subjects, TransactionId::new()).unwrap();
        manager.release(&subjects).unwrap();
        manager.release(&subjects).unwrap();
        assert!(manager.list_locked(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_list_locked_window() {
        let (_store, manager) = manager();
        let before = Timestamp::now();
        manager.acquire(&[subject("a")], TransactionId::new()).unwrap();

        assert_eq!(manager.list_locked(Some(before), None).unwrap().len(), 1);
        assert!(manager
            .list_locked(None, Some(Timestamp::from_micros(before.as_micros().saturating_sub(1))))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_remove_inert_locks_writes_audit() {
        let (store, manager) = manager();
        let inert = TransactionId::new();
        let live = TransactionId::new();
        manager.acquire(&[subject("a"), subject("b")], inert).unwrap();
        manager.acquire(&[subject("c")], live).unwrap();

        assert!(manager.remove_inert_locks(inert, "worker crashed").unwrap());
        assert!(!manager.remove_inert_locks(inert, "again").unwrap());

        let remaining = manager.list_locked(None, None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].locked_for_transaction, live);

        let audit = store.audit_records().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, AuditStatus::Completed);
        assert_eq!(audit[0].reason, "worker crashed");
        assert_eq!(audit[0].subjects.len(), 2);
        assert!(audit[0].finished_at.is_some());
    }
}
