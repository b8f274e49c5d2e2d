//! Tripod - triples stored as documents
//!
//! Tripod keeps RDF-style triples in a document store, one bounded
//! description document per subject and context, and keeps derived views,
//! table rows and search documents in step with them.
//!
//! # Quick Start
//!
//! ```ignore
//! use tripod::{Graph, Tripod};
//!
//! let tripod = Tripod::cache()?;
//!
//! let mut new = Graph::new();
//! new.add_uri("http://example.com/r1", "rdf:type", "acorn:Resource");
//! new.add_literal("http://example.com/r1", "dct:title", "wibble");
//! tripod.save_changes(&Graph::new(), &new, None, None)?;
//!
//! let described = tripod.describe_resource("http://example.com/r1", None)?;
//! ```
//!
//! # Architecture
//!
//! Writes go through the transaction coordinator: diff, lock, check, write,
//! log. Committed changes feed impact analysis, which decides which
//! materialized documents to regenerate inline or on a queue.

pub use tripod_composites::{
    CompositeEngine, ImpactAnalyzer, Namespaces, Regenerator, SpecKind, Specification,
    SpecificationRegistry, SEARCH_TERMS_FIELD,
};
pub use tripod_concurrency::{
    CardinalityRules, CommitHook, LockManager, SaveOutcome, StoreLockManager,
    TransactionCoordinator, TransactionMetrics,
};
pub use tripod_core::{
    AuditRecord, AuditStatus, Bdd, ChangedSubjects, DocumentStore, Error, ErrorKind, Graph,
    ImpactedSubject, LockRecord, MaterializedDocument, MaterializedKey, MaterializedValue, Object,
    Operation, Result, SubjectId, Timestamp, TransactionId, Triple, RDF_TYPE,
};
pub use tripod_durability::{
    replay, FileTransactionLog, MemoryTransactionLog, ReplayStats, TransactionLog,
    TransactionRecord, TransactionStatus,
};
pub use tripod_engine::{
    BackgroundJobQueue, JobQueue, MemoryJobQueue, OperationConfig, OperationsConfig,
    RegenerationJob, TransactionLogConfig, Tripod, TripodBuilder, TripodConfig, CONFIG_FILE_NAME,
};
pub use tripod_storage::{ExpirySweeper, MemoryDocumentStore};
