//! Concurrency layer for Tripod
//!
//! This crate implements the write pipeline with:
//! - LockManager: fail-fast, all-or-nothing per-subject locks
//! - CardinalityRules: per-predicate value bounds
//! - TransactionCoordinator: diff, lock, version check, merge, persist, log
//!
//! There is no in-process global lock. Writers touching disjoint subjects
//! run in parallel; writers sharing a subject serialize on the lock
//! collection and the loser fails immediately.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cardinality;
pub mod coordinator;
pub mod lock_manager;

pub use cardinality::CardinalityRules;
pub use coordinator::{CommitHook, SaveOutcome, TransactionCoordinator, TransactionMetrics};
pub use lock_manager::{LockManager, StoreLockManager};
