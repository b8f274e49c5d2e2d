//! Expired-composite sweeper
//!
//! `ExpirySweeper` runs in a background thread and periodically purges
//! TTL composites whose expiry has passed, through the store's normal
//! `purge_expired` path.
//!
//! # Design Notes
//!
//! - Runs in a background thread, never blocks writers
//! - Graceful shutdown via atomic flag
//! - Configurable check interval

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;
use tripod_core::{DocumentStore, Timestamp};

/// Background purge of expired TTL composites
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tripod_storage::{ExpirySweeper, MemoryDocumentStore};
///
/// let store = Arc::new(MemoryDocumentStore::new());
/// let sweeper = ExpirySweeper::new(store, Duration::from_secs(60));
/// let handle = sweeper.start();
///
/// sweeper.shutdown();
/// handle.join().unwrap();
/// ```
pub struct ExpirySweeper {
    store: Arc<dyn DocumentStore>,
    check_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl ExpirySweeper {
    /// Create a sweeper over `store` checking every `check_interval`
    pub fn new(store: Arc<dyn DocumentStore>, check_interval: Duration) -> Self {
        Self {
            store,
            check_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background task.
    ///
    /// The thread runs until `shutdown()` is called.
    pub fn start(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let shutdown = Arc::clone(&self.shutdown);
        let check_interval = self.check_interval;

        thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                // Short naps so shutdown is noticed quickly
                let sleep_interval = Duration::from_millis(100).min(check_interval);
                let mut elapsed = Duration::ZERO;

                while elapsed < check_interval {
                    if shutdown.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(sleep_interval);
                    elapsed += sleep_interval;
                }

                if let Err(e) = store.purge_expired(Timestamp::now()) {
                    warn!(target: "tripod::storage", error = %e, "Expiry sweep failed");
                }
            }
        })
    }

    /// Signal shutdown; the thread exits on its next check
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}
