//! Regeneration jobs and the queues that carry them
//!
//! A job carries the changed-subjects map of one `save_changes` call, not
//! pre-expanded impacted subjects. Impact analysis runs again when the job
//! executes, against the store as it is then, so running a job twice or out
//! of order is harmless.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tripod_composites::{ImpactAnalyzer, Regenerator};
use tripod_core::{ChangedSubjects, Operation, Result};

/// Payload of an asynchronous regeneration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationJob {
    /// Changed predicates per subject; empty set for deletions
    pub changed_subjects: ChangedSubjects,
    /// Kinds of document to bring up to date
    pub operations: Vec<Operation>,
    /// Store the changes were made in
    pub store_id: String,
    /// Pod the store lives in
    pub pod_id: String,
    /// Context of the write
    pub context: String,
}

/// What a job did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    /// Impacted subjects processed
    pub impacted: usize,
    /// Failures, one message per impacted subject
    pub errors: Vec<String>,
}

impl JobReport {
    /// True if every regeneration succeeded
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl RegenerationJob {
    /// Re-run impact analysis and regenerate everything it finds.
    ///
    /// Fails only if impact analysis itself fails; individual regeneration
    /// failures are collected in the report.
    pub fn execute(
        &self,
        analyzer: &ImpactAnalyzer,
        regenerator: &dyn Regenerator,
    ) -> Result<JobReport> {
        let impacted = analyzer.impacted_subjects(&self.changed_subjects, &self.operations)?;
        let mut report = JobReport {
            impacted: impacted.len(),
            errors: Vec::new(),
        };
        for subject in &impacted {
            if let Err(e) = regenerator.update(subject) {
                warn!(
                    target: "tripod::dispatch",
                    subject = %subject.id,
                    operation = %subject.operation,
                    error = %e,
                    "Regeneration failed"
                );
                report
                    .errors
                    .push(format!("{} {}: {}", subject.operation, subject.id, e));
            }
        }
        debug!(
            target: "tripod::dispatch",
            store_id = %self.store_id,
            context = %self.context,
            impacted = report.impacted,
            failed = report.errors.len(),
            "Regeneration job finished"
        );
        Ok(report)
    }
}

/// Transport for asynchronous regeneration
pub trait JobQueue: Send + Sync {
    /// Submit `job` to the named queue
    fn enqueue(&self, job: RegenerationJob, queue: &str) -> Result<()>;
}

/// Collects jobs for a caller to run later
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<(String, RegenerationJob)>>,
}

impl MemoryJobQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued job with its queue name, oldest first
    pub fn drain(&self) -> Vec<(String, RegenerationJob)> {
        std::mem::take(&mut *self.jobs.lock())
    }

    /// Jobs waiting
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// True if nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

impl JobQueue for MemoryJobQueue {
    fn enqueue(&self, job: RegenerationJob, queue: &str) -> Result<()> {
        self.jobs.lock().push((queue.to_string(), job));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripod_core::SubjectId;

    fn job() -> RegenerationJob {
        let mut changed = ChangedSubjects::new();
        changed.insert_deleted(SubjectId::new("http://x/a", "http://ctx"));
        RegenerationJob {
            changed_subjects: changed,
            operations: vec![Operation::Tables, Operation::Search],
            store_id: "tripod".into(),
            pod_id: "pod".into(),
            context: "http://ctx".into(),
        }
    }

    #[test]
    fn test_memory_queue_drains_in_order() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(job(), "a").unwrap();
        queue.enqueue(job(), "b").unwrap();
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(
            drained.iter().map(|(q, _)| q.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_job_payload_is_serializable() {
        let json = serde_json::to_value(job()).unwrap();
        assert_eq!(json["operations"], serde_json::json!(["tables", "search"]));
        let back: RegenerationJob = serde_json::from_value(json).unwrap();
        assert_eq!(back, job());
    }
}
