//! Background regeneration workers.
//!
//! A FIFO job queue drained by a fixed pool of worker threads. Each named
//! queue shares the same pool; the name is kept for logging.

use crate::queue::{JobQueue, RegenerationJob};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, warn};
use tripod_core::{Error, Result};

/// Runs one job
pub trait JobHandler: Send + Sync {
    /// Execute `job`; errors are logged by the worker
    fn handle(&self, job: &RegenerationJob) -> Result<()>;
}

/// Queue metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of jobs waiting in the queue.
    pub queue_depth: usize,
    /// Number of jobs currently being executed by workers.
    pub active_jobs: usize,
    /// Total number of jobs finished since creation.
    pub jobs_completed: u64,
    /// Jobs whose handler returned an error or panicked.
    pub jobs_failed: u64,
    /// Number of worker threads.
    pub worker_count: usize,
}

struct QueuedJob {
    queue: String,
    job: RegenerationJob,
}

struct Inner {
    queue: Mutex<VecDeque<QueuedJob>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_jobs: AtomicUsize,
    max_queue_depth: usize,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    handler: Arc<dyn JobHandler>,
}

/// Job queue executed by worker threads in this process.
pub struct BackgroundJobQueue {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl BackgroundJobQueue {
    /// Start `num_threads` workers running jobs through `handler`.
    ///
    /// Workers are named `tripod-regen-0`, `tripod-regen-1`, etc.
    pub fn new(
        handler: Arc<dyn JobHandler>,
        num_threads: usize,
        max_queue_depth: usize,
    ) -> Result<Self> {
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_jobs: AtomicUsize::new(0),
            max_queue_depth,
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            handler,
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let inner_clone = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("tripod-regen-{}", i))
                .spawn(move || worker_loop(&inner_clone))?;
            workers.push(handle);
        }

        Ok(Self {
            inner,
            workers: Mutex::new(workers),
            num_threads,
        })
    }

    /// Block until all queued and in-flight jobs have completed.
    ///
    /// Workers keep running afterwards.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active_jobs.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Signal workers to exit once the queue is empty and join them.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);

        // Notify under the queue lock so a worker between its shutdown
        // check and its wait cannot miss the wakeup
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Return a snapshot of queue metrics.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            active_jobs: self.inner.active_jobs.load(Ordering::Relaxed),
            jobs_completed: self.inner.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.inner.jobs_failed.load(Ordering::Relaxed),
            worker_count: self.num_threads,
        }
    }
}

impl JobQueue for BackgroundJobQueue {
    fn enqueue(&self, job: RegenerationJob, queue: &str) -> Result<()> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(Error::storage("regeneration queue is shut down"));
        }
        if self.inner.queue_depth.load(Ordering::Acquire) >= self.inner.max_queue_depth {
            return Err(Error::storage(format!("regeneration queue {} is full", queue)));
        }

        {
            let mut pending = self.inner.queue.lock();
            pending.push_back(QueuedJob {
                queue: queue.to_string(),
                job,
            });
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }

        self.inner.work_ready.notify_one();
        Ok(())
    }
}

impl Drop for BackgroundJobQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decrements `active_jobs` and wakes drain waiters on drop, even if the
/// job panicked.
struct ActiveJobGuard<'a> {
    inner: &'a Inner,
}

impl Drop for ActiveJobGuard<'_> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_jobs.fetch_sub(1, Ordering::Release);
        self.inner.jobs_completed.fetch_add(1, Ordering::Relaxed);

        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &Inner) {
    loop {
        let queued = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(queued) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active_jobs.fetch_add(1, Ordering::Release);
                    break queued;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveJobGuard { inner };

        let handler = Arc::clone(&inner.handler);
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.handle(&queued.job)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                inner.jobs_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "tripod::dispatch",
                    queue = %queued.queue,
                    context = %queued.job.context,
                    error = %e,
                    "Regeneration job failed"
                );
            }
            Err(panic) => {
                inner.jobs_failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    target: "tripod::dispatch",
                    queue = %queued.queue,
                    "Regeneration job panicked: {:?}",
                    panic.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
                );
            }
        }
    }
}
