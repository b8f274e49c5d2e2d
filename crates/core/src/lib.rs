//! Core types and traits for Tripod
//!
//! This crate defines the foundational types used throughout the system:
//! - SubjectId / Object / Triple / Graph: the RDF-facing data model
//! - Changeset / ChangedSubjects: differences between graph states
//! - Bdd / Snapshot: the per-subject stored document and its images
//! - LockRecord / AuditRecord: lock documents and their audit trail
//! - ImpactedSubject / MaterializedDocument: derived-document bookkeeping
//! - Error: error taxonomy
//! - DocumentStore: persistence adapter trait

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod changeset;
pub mod document;
pub mod error;
pub mod graph;
pub mod impact;
pub mod lock;
pub mod materialized;
pub mod timestamp;
pub mod traits;
pub mod types;

pub use changeset::{ChangedSubjectEntry, ChangedSubjects, Changeset, SubjectChanges};
pub use document::{Bdd, Snapshot};
pub use error::{Error, ErrorKind, Result};
pub use graph::{Graph, Triple};
pub use impact::ImpactedSubject;
pub use lock::{AuditKind, AuditRecord, AuditStatus, LockRecord};
pub use materialized::{
    DescribedNode, Freshness, MaterializedDocument, MaterializedKey, MaterializedValue,
};
pub use timestamp::Timestamp;
pub use traits::{DocumentStore, ReadPreference, ReadPreferenceGuard};
pub use types::{Object, Operation, SubjectId, TransactionId, RDF_ORDINAL_PREFIX, RDF_TYPE};
