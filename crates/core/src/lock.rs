//! Lock and audit records
//!
//! A lock document exists for a subject exactly while some transaction is
//! mutating it. Locks that outlive their transaction ("inert" locks) are
//! cleared administratively, and every clearing leaves an audit record.

use crate::timestamp::Timestamp;
use crate::types::{SubjectId, TransactionId};
use serde::{Deserialize, Serialize};

/// Exclusive lock on one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Locked subject
    pub id: SubjectId,
    /// Transaction holding the lock
    pub locked_for_transaction: TransactionId,
    /// When the lock was taken
    pub locked_at: Timestamp,
}

/// What an audit record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Forced removal of locks left behind by a transaction
    RemoveInertLocks,
}

/// Progress of an audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Started, not yet finished
    InProgress,
    /// Finished successfully
    Completed,
    /// Failed; see `error`
    Error,
}

/// Audit trail entry for an administrative operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique id of the audit entry
    pub id: String,
    /// Operation audited
    pub kind: AuditKind,
    /// Transaction whose locks were targeted
    pub transaction_id: TransactionId,
    /// Operator-supplied reason
    pub reason: String,
    /// Current status
    pub status: AuditStatus,
    /// Error message when `status` is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Subjects whose locks were removed
    #[serde(default)]
    pub subjects: Vec<SubjectId>,
    /// When the operation started
    pub started_at: Timestamp,
    /// When the operation finished, either way
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}
