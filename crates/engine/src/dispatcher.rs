//! Post-commit regeneration dispatch
//!
//! Each operation kind is either regenerated inline on the writer's thread
//! or packaged into a job for its queue. Async operations sharing a queue
//! travel in one job per save.

use crate::background::JobHandler;
use crate::database::config::OperationsConfig;
use crate::queue::{JobQueue, RegenerationJob};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use tripod_composites::{ImpactAnalyzer, Regenerator};
use tripod_concurrency::CommitHook;
use tripod_core::{ChangedSubjects, Operation, Result};

/// Commit hook routing changes to inline or queued regeneration
pub struct Dispatcher {
    analyzer: Arc<ImpactAnalyzer>,
    regenerator: Arc<dyn Regenerator>,
    operations: OperationsConfig,
    queue: Arc<dyn JobQueue>,
    store_id: String,
    pod_id: String,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(
        analyzer: Arc<ImpactAnalyzer>,
        regenerator: Arc<dyn Regenerator>,
        operations: OperationsConfig,
        queue: Arc<dyn JobQueue>,
        store_id: impl Into<String>,
        pod_id: impl Into<String>,
    ) -> Self {
        Dispatcher {
            analyzer,
            regenerator,
            operations,
            queue,
            store_id: store_id.into(),
            pod_id: pod_id.into(),
        }
    }

    /// Operation kinds regenerated inline
    pub fn sync_operations(&self) -> Vec<Operation> {
        Operation::ALL
            .iter()
            .copied()
            .filter(|op| !self.operations.get(*op).is_async)
            .collect()
    }

    /// Async operation kinds grouped by queue name
    pub fn async_operations(&self) -> BTreeMap<String, Vec<Operation>> {
        let mut queues: BTreeMap<String, Vec<Operation>> = BTreeMap::new();
        for op in Operation::ALL.iter().copied() {
            let config = self.operations.get(op);
            if config.is_async {
                queues
                    .entry(config.queue_name().to_string())
                    .or_default()
                    .push(op);
            }
        }
        queues
    }

    fn run_inline(&self, changed: &ChangedSubjects, operations: &[Operation]) -> Vec<String> {
        let impacted = match self.analyzer.impacted_subjects(changed, operations) {
            Ok(impacted) => impacted,
            Err(e) => return vec![format!("impact analysis failed: {}", e)],
        };
        let mut errors = Vec::new();
        for subject in &impacted {
            if let Err(e) = self.regenerator.update(subject) {
                errors.push(format!("{} {}: {}", subject.operation, subject.id, e));
            }
        }
        debug!(
            target: "tripod::dispatch",
            impacted = impacted.len(),
            failed = errors.len(),
            "Inline regeneration finished"
        );
        errors
    }
}

impl CommitHook for Dispatcher {
    fn after_commit(&self, changed: &ChangedSubjects, context: &str) -> Vec<String> {
        let mut errors = Vec::new();

        let inline = self.sync_operations();
        if !inline.is_empty() {
            errors.extend(self.run_inline(changed, &inline));
        }

        for (queue, operations) in self.async_operations() {
            let job = RegenerationJob {
                changed_subjects: changed.clone(),
                operations,
                store_id: self.store_id.clone(),
                pod_id: self.pod_id.clone(),
                context: context.to_string(),
            };
            match self.queue.enqueue(job, &queue) {
                Ok(()) => {
                    debug!(target: "tripod::dispatch", queue = %queue, subjects = changed.len(), "Regeneration job queued")
                }
                Err(e) => {
                    warn!(target: "tripod::dispatch", queue = %queue, error = %e, "Failed to queue regeneration job");
                    errors.push(format!("enqueue on {} failed: {}", queue, e));
                }
            }
        }
        errors
    }
}

/// Runs queued jobs against an analyzer and a regenerator
pub struct JobExecutor {
    analyzer: Arc<ImpactAnalyzer>,
    regenerator: Arc<dyn Regenerator>,
}

impl JobExecutor {
    /// Create an executor
    pub fn new(analyzer: Arc<ImpactAnalyzer>, regenerator: Arc<dyn Regenerator>) -> Self {
        JobExecutor {
            analyzer,
            regenerator,
        }
    }

    /// Execute `job`, returning its error messages
    pub fn run(&self, job: &RegenerationJob) -> Result<Vec<String>> {
        Ok(job
            .execute(&self.analyzer, self.regenerator.as_ref())?
            .errors)
    }
}

impl JobHandler for JobExecutor {
    fn handle(&self, job: &RegenerationJob) -> Result<()> {
        let report = job.execute(&self.analyzer, self.regenerator.as_ref())?;
        match report.errors.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(tripod_core::Error::storage(first)),
        }
    }
}
