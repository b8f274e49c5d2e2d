//! Transaction records
//!
//! One record is created at the start of every write attempt. It carries
//! the changeset in audit form plus before- and after-images of every
//! affected subject, and moves from `Pending` to exactly one of
//! `Completed` or `Failed`. Once it leaves `Pending` it is never changed
//! again.

use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use tripod_core::{Changeset, Snapshot, SubjectId, Timestamp, TransactionId};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Created, not finished
    Pending,
    /// Every subject was written
    Completed,
    /// Aborted; see `TransactionRecord::error`
    Failed,
}

impl TransactionStatus {
    /// True for `Completed` and `Failed`
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Why a transaction failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionError {
    /// Human-readable reason
    pub reason: String,
    /// Captured stack trace, empty when backtraces are disabled
    pub trace: String,
}

impl TransactionError {
    /// Capture the current stack alongside `reason`
    pub fn capture(reason: impl Into<String>) -> Self {
        TransactionError {
            reason: reason.into(),
            trace: Backtrace::capture().to_string(),
        }
    }
}

/// A logged write attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction id
    pub id: TransactionId,
    /// Current status
    pub status: TransactionStatus,
    /// Caller-supplied description
    #[serde(default)]
    pub description: Option<String>,
    /// Context the save was made in
    pub context: String,
    /// When the attempt started
    pub start_time: Timestamp,
    /// Set on completion
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    /// Set on failure
    #[serde(default)]
    pub failed_time: Option<Timestamp>,
    /// Added and removed triples per subject
    pub changes: Changeset,
    /// Pre-images read from the store before locking
    pub original_bdds: Vec<Snapshot>,
    /// Post-images, filled in on completion
    #[serde(default)]
    pub new_bdds: Vec<Snapshot>,
    /// Failure detail
    #[serde(default)]
    pub error: Option<TransactionError>,
}

impl TransactionRecord {
    /// New pending record
    pub fn pending(
        id: TransactionId,
        context: impl Into<String>,
        description: Option<String>,
        changes: Changeset,
        original_bdds: Vec<Snapshot>,
        start_time: Timestamp,
    ) -> Self {
        TransactionRecord {
            id,
            status: TransactionStatus::Pending,
            description,
            context: context.into(),
            start_time,
            end_time: None,
            failed_time: None,
            changes,
            original_bdds,
            new_bdds: Vec::new(),
            error: None,
        }
    }

    /// Mark completed with the post-images of every subject
    pub fn complete(&mut self, new_bdds: Vec<Snapshot>, now: Timestamp) {
        self.status = TransactionStatus::Completed;
        self.new_bdds = new_bdds;
        self.end_time = Some(now);
    }

    /// Mark failed
    pub fn fail(&mut self, error: TransactionError, now: Timestamp) {
        self.status = TransactionStatus::Failed;
        self.failed_time = Some(now);
        self.error = Some(error);
    }

    /// Subjects the transaction touched
    pub fn subjects(&self) -> impl Iterator<Item = &SubjectId> {
        self.original_bdds.iter().map(|s| &s.id)
    }

    /// Post-image for one subject
    pub fn new_bdd(&self, id: &SubjectId) -> Option<&Snapshot> {
        self.new_bdds.iter().find(|s| &s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TransactionRecord {
        TransactionRecord::pending(
            TransactionId::new(),
            "http://ctx",
            Some("test".to_string()),
            Changeset::default(),
            vec![Snapshot::absent(SubjectId::new("http://x/a", "http://ctx"))],
            Timestamp::from_secs(1),
        )
    }

    #[test]
    fn test_complete_sets_end_time() {
        let mut r = record();
        assert!(!r.status.is_terminal());
        r.complete(Vec::new(), Timestamp::from_secs(2));
        assert_eq!(r.status, TransactionStatus::Completed);
        assert_eq!(r.end_time, Some(Timestamp::from_secs(2)));
        assert!(r.failed_time.is_none());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut r = record();
        r.fail(TransactionError::capture("interleaving update"), Timestamp::from_secs(3));
        assert_eq!(r.status, TransactionStatus::Failed);
        assert_eq!(r.failed_time, Some(Timestamp::from_secs(3)));
        assert_eq!(r.error.as_ref().unwrap().reason, "interleaving update");
        assert!(r.end_time.is_none());
    }

    #[test]
    fn test_subjects_come_from_original_images() {
        let r = record();
        let subjects: Vec<_> = r.subjects().collect();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].resource, "http://x/a");
    }
}
