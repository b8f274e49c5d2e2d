//! Tripod store handle and open/close logic
//!
//! `Tripod` wires one store together:
//! - the document store and lock manager
//! - the transaction log (memory or file, per `tripod.toml`)
//! - the transaction coordinator, with the dispatcher as its commit hook
//! - the composite engine and impact analyzer
//! - the regeneration worker pool
//!
//! Writes go through [`Tripod::save_changes`]. Composite reads regenerate
//! missing or expired documents before returning them.

pub mod builder;
pub mod config;

pub use builder::TripodBuilder;
pub use config::{
    OperationConfig, OperationsConfig, TransactionLogConfig, TripodConfig, CONFIG_FILE_NAME,
    DEFAULT_QUEUE,
};

use crate::background::{BackgroundJobQueue, QueueStats};
use crate::dispatcher::{Dispatcher, JobExecutor};
use crate::queue::{JobQueue, RegenerationJob};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};
use tripod_composites::{CompositeEngine, ImpactAnalyzer, SpecKind, SpecificationRegistry};
use tripod_concurrency::{LockManager, SaveOutcome, TransactionCoordinator, TransactionMetrics};
use tripod_core::{
    AuditRecord, DocumentStore, Error, Graph, LockRecord, MaterializedDocument, Result,
    SubjectId, Timestamp, TransactionId,
};
use tripod_durability::{ReplayStats, TransactionLog};
use tripod_storage::ExpirySweeper;

// ============================================================================
// Job routing
// ============================================================================

/// Where async regeneration goes
enum Jobs {
    /// Worker threads owned by this handle
    Workers(Arc<BackgroundJobQueue>),
    /// A queue supplied by the caller
    External(Arc<dyn JobQueue>),
}

impl Jobs {
    fn queue(&self) -> Arc<dyn JobQueue> {
        match self {
            Jobs::Workers(workers) => Arc::clone(workers) as Arc<dyn JobQueue>,
            Jobs::External(queue) => Arc::clone(queue),
        }
    }
}

// ============================================================================
// Tripod
// ============================================================================

/// One triple store over a document store
pub struct Tripod {
    config: TripodConfig,
    data_dir: Option<PathBuf>,
    store: Arc<dyn DocumentStore>,
    log: Arc<dyn TransactionLog>,
    coordinator: TransactionCoordinator,
    engine: Arc<CompositeEngine>,
    analyzer: Arc<ImpactAnalyzer>,
    executor: Arc<JobExecutor>,
    jobs: Jobs,
    sweeper: Mutex<Option<(ExpirySweeper, JoinHandle<()>)>>,
}

impl Tripod {
    /// Open a store rooted at `path`.
    ///
    /// Reads `tripod.toml` from the directory, writing the default file
    /// first if there is none.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        TripodConfig::write_default_if_missing(&config_path)?;
        let cfg = TripodConfig::from_file(&config_path)?;

        Self::open_in(data_dir, cfg)
    }

    /// Open a store rooted at `path` with an explicit configuration.
    ///
    /// The configuration is written to `tripod.toml` so a later
    /// [`Tripod::open`] picks up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, cfg: TripodConfig) -> Result<Self> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        cfg.validate()?;
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        cfg.write_to_file(&config_path)?;

        Self::open_in(data_dir, cfg)
    }

    /// Build with a relative log path resolved against `data_dir`
    fn open_in(data_dir: PathBuf, mut cfg: TripodConfig) -> Result<Self> {
        if let TransactionLogConfig::File { path: log_path } = &mut cfg.transaction_log {
            if log_path.is_relative() {
                *log_path = data_dir.join(&*log_path);
            }
        }

        let mut tripod = TripodBuilder::new(cfg).build()?;
        tripod.data_dir = Some(data_dir);
        Ok(tripod)
    }

    /// In-memory store with the default configuration and no files
    pub fn cache() -> Result<Self> {
        Self::in_memory(TripodConfig::default())
    }

    /// In-memory store with `cfg`; a file transaction log is still honored
    pub fn in_memory(cfg: TripodConfig) -> Result<Self> {
        TripodBuilder::new(cfg).build()
    }

    /// Builder for substituting collaborators
    pub fn builder(cfg: TripodConfig) -> TripodBuilder {
        TripodBuilder::new(cfg)
    }

    pub(crate) fn assemble(
        config: TripodConfig,
        store: Arc<dyn DocumentStore>,
        locks: Arc<dyn LockManager>,
        log: Arc<dyn TransactionLog>,
        queue: Option<Arc<dyn JobQueue>>,
    ) -> Result<Self> {
        let registry = Arc::new(config.registry()?);
        let namespaces = Arc::new(config.namespaces());

        let engine = Arc::new(
            CompositeEngine::new(
                Arc::clone(&registry),
                Arc::clone(&store),
                Arc::clone(&namespaces),
            )
            .with_max_joins(config.max_joins),
        );
        let analyzer = Arc::new(ImpactAnalyzer::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            namespaces,
            config.store_id.clone(),
            config.pod_id.clone(),
        ));
        let executor = Arc::new(JobExecutor::new(
            Arc::clone(&analyzer),
            Arc::clone(&engine) as _,
        ));

        let jobs = match queue {
            Some(queue) => Jobs::External(queue),
            None => Jobs::Workers(Arc::new(BackgroundJobQueue::new(
                Arc::clone(&executor) as _,
                config.workers,
                config.queue_depth,
            )?)),
        };

        let dispatcher = Dispatcher::new(
            Arc::clone(&analyzer),
            Arc::clone(&engine) as _,
            config.operations.clone(),
            jobs.queue(),
            config.store_id.clone(),
            config.pod_id.clone(),
        );
        let coordinator =
            TransactionCoordinator::new(Arc::clone(&store), locks, Arc::clone(&log))
                .with_cardinality(config.cardinality_rules())
                .with_hook(Arc::new(dispatcher));

        info!(
            target: "tripod::txn",
            store_id = %config.store_id,
            pod_id = %config.pod_id,
            specifications = registry.len(),
            "Tripod opened"
        );

        Ok(Self {
            config,
            data_dir: None,
            store,
            log,
            coordinator,
            engine,
            analyzer,
            executor,
            jobs,
            sweeper: Mutex::new(None),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The configuration this store was opened with
    pub fn config(&self) -> &TripodConfig {
        &self.config
    }

    /// Directory holding `tripod.toml`, if the store was opened from one
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// The document store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The transaction log
    pub fn transaction_log(&self) -> &Arc<dyn TransactionLog> {
        &self.log
    }

    /// The specifications in use
    pub fn registry(&self) -> &Arc<SpecificationRegistry> {
        self.engine.registry()
    }

    /// The composite engine
    pub fn engine(&self) -> &Arc<CompositeEngine> {
        &self.engine
    }

    /// The impact analyzer
    pub fn analyzer(&self) -> &Arc<ImpactAnalyzer> {
        &self.analyzer
    }

    /// Transaction counters
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }

    fn context<'a>(&'a self, context: Option<&'a str>) -> &'a str {
        context.unwrap_or(&self.config.default_context)
    }

    // ========================================================================
    // Reads and writes
    // ========================================================================

    /// Graph of one stored subject; empty if it does not exist
    pub fn describe_resource(&self, resource: &str, context: Option<&str>) -> Result<Graph> {
        self.describe_resources(&[resource], context)
    }

    /// Merged graph of several stored subjects; missing ones add nothing
    pub fn describe_resources(&self, resources: &[&str], context: Option<&str>) -> Result<Graph> {
        let context = self.context(context);
        let mut graph = Graph::new();
        for resource in resources {
            if let Some(bdd) = self.store.get_bdd(&SubjectId::new(*resource, context))? {
                graph.merge(bdd.to_graph());
            }
        }
        Ok(graph)
    }

    /// Save the difference between `old` and `new`.
    ///
    /// `context` defaults to the configured default context.
    pub fn save_changes(
        &self,
        old: &Graph,
        new: &Graph,
        context: Option<&str>,
        description: Option<&str>,
    ) -> Result<SaveOutcome> {
        self.coordinator
            .save_changes(old, new, self.context(context), description)
    }

    /// A view document, regenerated first if missing
    pub fn get_view(
        &self,
        spec_id: &str,
        resource: &str,
        context: Option<&str>,
    ) -> Result<Option<MaterializedDocument>> {
        self.get_composite(SpecKind::View, spec_id, resource, context)
    }

    /// A table row, regenerated first if missing or expired
    pub fn get_table_row(
        &self,
        spec_id: &str,
        resource: &str,
        context: Option<&str>,
    ) -> Result<Option<MaterializedDocument>> {
        self.get_composite(SpecKind::Table, spec_id, resource, context)
    }

    /// A search document, regenerated first if missing or expired
    pub fn get_search_document(
        &self,
        spec_id: &str,
        resource: &str,
        context: Option<&str>,
    ) -> Result<Option<MaterializedDocument>> {
        self.get_composite(SpecKind::Search, spec_id, resource, context)
    }

    /// Documents of one specification for several subjects; only missing
    /// or expired ones are regenerated
    pub fn get_composites(
        &self,
        spec_id: &str,
        resources: &[&str],
        context: Option<&str>,
    ) -> Result<Vec<MaterializedDocument>> {
        let context = self.context(context);
        let subjects: Vec<SubjectId> = resources
            .iter()
            .map(|resource| SubjectId::new(*resource, context))
            .collect();
        self.engine.get_many(spec_id, &subjects)
    }

    fn get_composite(
        &self,
        kind: SpecKind,
        spec_id: &str,
        resource: &str,
        context: Option<&str>,
    ) -> Result<Option<MaterializedDocument>> {
        let spec = self.registry().require(spec_id)?;
        if spec.kind != kind {
            return Err(Error::configuration(format!(
                "{} is a {:?} specification, not a {:?}",
                spec_id, spec.kind, kind
            )));
        }
        let subject = SubjectId::new(resource, self.context(context));
        self.engine.get_or_regenerate(spec_id, &subject)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Replay completed transactions ending in `[from, to]` into this store
    pub fn replay(&self, from: Option<Timestamp>, to: Option<Timestamp>) -> Result<ReplayStats> {
        self.replay_into(self.store.as_ref(), from, to)
    }

    /// Replay completed transactions ending in `[from, to]` into `store`
    pub fn replay_into(
        &self,
        store: &dyn DocumentStore,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<ReplayStats> {
        tripod_durability::replay(self.log.as_ref(), store, from, to)
    }

    /// Locks currently held, optionally windowed by lock time
    pub fn locked(&self, from: Option<Timestamp>, till: Option<Timestamp>) -> Result<Vec<LockRecord>> {
        self.coordinator.lock_manager().list_locked(from, till)
    }

    /// Force-clear the locks left by `transaction_id`, leaving an audit
    /// record. Returns false when it held none.
    pub fn remove_inert_locks(&self, transaction_id: TransactionId, reason: &str) -> Result<bool> {
        self.coordinator
            .lock_manager()
            .remove_inert_locks(transaction_id, reason)
    }

    /// Audit trail of administrative lock removals
    pub fn audit_records(&self) -> Result<Vec<AuditRecord>> {
        self.store.audit_records()
    }

    /// Rebuild every document of `spec_id` in `context`
    pub fn regenerate_all(&self, spec_id: &str, context: Option<&str>) -> Result<usize> {
        self.engine.regenerate_all(spec_id, self.context(context))
    }

    /// Delete expired TTL documents now
    pub fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired(Timestamp::now())
    }

    /// Purge expired TTL documents every `interval` on a background thread.
    ///
    /// Replaces any sweeper already running.
    pub fn start_expiry_sweeper(&self, interval: Duration) {
        let sweeper = ExpirySweeper::new(Arc::clone(&self.store), interval);
        let handle = sweeper.start();
        if let Some((old, old_handle)) = self.sweeper.lock().replace((sweeper, handle)) {
            old.shutdown();
            let _ = old_handle.join();
        }
    }

    // ========================================================================
    // Async regeneration
    // ========================================================================

    /// Execute one regeneration job here and now; returns its error
    /// messages
    pub fn run_job(&self, job: &RegenerationJob) -> Result<Vec<String>> {
        self.executor.run(job)
    }

    /// Block until every queued job has run.
    ///
    /// No effect when jobs go to a caller-supplied queue.
    pub fn drain_jobs(&self) {
        if let Jobs::Workers(workers) = &self.jobs {
            workers.drain();
        }
    }

    /// Worker pool counters, when this handle owns the workers
    pub fn queue_stats(&self) -> Option<QueueStats> {
        match &self.jobs {
            Jobs::Workers(workers) => Some(workers.stats()),
            Jobs::External(_) => None,
        }
    }

    /// Finish queued work and stop background threads
    pub fn shutdown(&self) {
        if let Some((sweeper, handle)) = self.sweeper.lock().take() {
            sweeper.shutdown();
            if handle.join().is_err() {
                warn!(target: "tripod::storage", "Expiry sweeper panicked");
            }
        }
        if let Jobs::Workers(workers) = &self.jobs {
            workers.drain();
            workers.shutdown();
        }
        info!(target: "tripod::txn", store_id = %self.config.store_id, "Tripod shut down");
    }
}

impl Drop for Tripod {
    fn drop(&mut self) {
        if let Some((sweeper, handle)) = self.sweeper.lock().take() {
            sweeper.shutdown();
            let _ = handle.join();
        }
        if let Jobs::Workers(workers) = &self.jobs {
            workers.shutdown();
        }
    }
}
