//! Transaction log abstraction and in-memory implementation
//!
//! The log is one logical collection of transaction records, addressable
//! independently of the primary document store. Records are appended once
//! when a write attempt starts and updated once when it finishes; a record
//! that has reached a terminal status is immutable.

use crate::record::{TransactionRecord, TransactionStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;
use tripod_core::{Error, Result, Timestamp, TransactionId};

/// Message used when a record cannot be created
pub const APPEND_FAILED: &str = "Error creating new transaction";

/// Append-only store of transaction records
pub trait TransactionLog: Send + Sync {
    /// Insert a new record. Fails if the id is already present.
    fn append(&self, record: &TransactionRecord) -> Result<()>;

    /// Replace a pending record with its terminal form
    fn update(&self, record: &TransactionRecord) -> Result<()>;

    /// Look up one record
    fn get(&self, id: &TransactionId) -> Result<Option<TransactionRecord>>;

    /// Every record, optionally restricted to one status, oldest start first
    fn list(&self, status: Option<TransactionStatus>) -> Result<Vec<TransactionRecord>>;

    /// Completed records whose end time lies in the inclusive window
    fn completed_between(
        &self,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<Vec<TransactionRecord>> {
        Ok(self
            .list(Some(TransactionStatus::Completed))?
            .into_iter()
            .filter(|r| r.end_time.map_or(false, |end| end.within(from, to)))
            .collect())
    }
}

/// Check that `record` may replace `existing`
pub(crate) fn check_update(
    existing: Option<&TransactionRecord>,
    record: &TransactionRecord,
) -> Result<()> {
    match existing {
        None => Err(Error::NotFound(format!("transaction {}", record.id))),
        Some(existing) if existing.status.is_terminal() => Err(Error::storage(format!(
            "transaction {} is already {:?}",
            record.id, existing.status
        ))),
        Some(_) => Ok(()),
    }
}

/// Sort by start time, breaking ties by id
pub(crate) fn sort_records(records: &mut [TransactionRecord]) {
    records.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
}

/// Transaction log held in memory
#[derive(Debug, Default)]
pub struct MemoryTransactionLog {
    records: RwLock<HashMap<TransactionId, TransactionRecord>>,
}

impl MemoryTransactionLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Drop every record
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl TransactionLog for MemoryTransactionLog {
    fn append(&self, record: &TransactionRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(Error::storage(format!(
                "{}: duplicate id {}",
                APPEND_FAILED, record.id
            )));
        }
        records.insert(record.id, record.clone());
        debug!(target: "tripod::log", txn_id = %record.id, "Transaction appended");
        Ok(())
    }

    fn update(&self, record: &TransactionRecord) -> Result<()> {
        let mut records = self.records.write();
        check_update(records.get(&record.id), record)?;
        records.insert(record.id, record.clone());
        debug!(target: "tripod::log", txn_id = %record.id, status = ?record.status, "Transaction updated");
        Ok(())
    }

    fn get(&self, id: &TransactionId) -> Result<Option<TransactionRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn list(&self, status: Option<TransactionStatus>) -> Result<Vec<TransactionRecord>> {
        let mut records: Vec<TransactionRecord> = self
            .records
            .read()
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        sort_records(&mut records);
        Ok(records)
    }
}
