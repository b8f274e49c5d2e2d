//! Tripod builder for swapping collaborators
//!
//! The document store, lock manager, transaction log and job queue each sit
//! behind a trait. The builder wires the defaults from `TripodConfig` and
//! lets callers substitute any of them, typically in-memory fakes in tests.

use std::sync::Arc;
use tripod_concurrency::{LockManager, StoreLockManager};
use tripod_core::{DocumentStore, Result};
use tripod_durability::{FileTransactionLog, MemoryTransactionLog, TransactionLog};
use tripod_storage::MemoryDocumentStore;

use super::config::{TransactionLogConfig, TripodConfig};
use super::Tripod;
use crate::queue::JobQueue;

// ============================================================================
// Tripod Builder
// ============================================================================

/// Builder for a [`Tripod`] with optional replacement collaborators
///
/// ```ignore
/// use std::sync::Arc;
/// use tripod_engine::{MemoryJobQueue, Tripod, TripodConfig};
///
/// let jobs = Arc::new(MemoryJobQueue::new());
/// let tripod = Tripod::builder(TripodConfig::default())
///     .job_queue(jobs.clone())
///     .build()?;
/// ```
pub struct TripodBuilder {
    config: TripodConfig,
    store: Option<Arc<dyn DocumentStore>>,
    locks: Option<Arc<dyn LockManager>>,
    log: Option<Arc<dyn TransactionLog>>,
    queue: Option<Arc<dyn JobQueue>>,
}

impl TripodBuilder {
    /// Builder over `config` with every collaborator defaulted
    pub fn new(config: TripodConfig) -> Self {
        Self {
            config,
            store: None,
            locks: None,
            log: None,
            queue: None,
        }
    }

    /// Use `store` instead of a fresh in-memory store
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `locks` instead of locks kept in the store
    pub fn lock_manager(mut self, locks: Arc<dyn LockManager>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Use `log` instead of the configured transaction log
    pub fn transaction_log(mut self, log: Arc<dyn TransactionLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Send async regeneration to `queue` instead of the worker pool.
    ///
    /// The caller becomes responsible for running the jobs, for example
    /// through [`Tripod::run_job`].
    pub fn job_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Validate the configuration and assemble the store
    pub fn build(self) -> Result<Tripod> {
        self.config.validate()?;

        let store: Arc<dyn DocumentStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryDocumentStore::new()),
        };
        let locks: Arc<dyn LockManager> = match self.locks {
            Some(locks) => locks,
            None => Arc::new(StoreLockManager::new(Arc::clone(&store))),
        };
        let log: Arc<dyn TransactionLog> = match self.log {
            Some(log) => log,
            None => match &self.config.transaction_log {
                TransactionLogConfig::Memory => Arc::new(MemoryTransactionLog::new()),
                TransactionLogConfig::File { path } => Arc::new(FileTransactionLog::open(path)?),
            },
        };

        Tripod::assemble(self.config, store, locks, log, self.queue)
    }
}
