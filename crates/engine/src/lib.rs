//! Store engine for Tripod
//!
//! This crate wires the lower layers into one handle:
//! - Tripod: open/close, writes, composite reads, administration
//! - TripodConfig: `tripod.toml` loading and validation
//! - Dispatcher: post-commit regeneration, inline or queued per operation
//! - BackgroundJobQueue: worker threads running queued regeneration
//!
//! The engine is the only component that knows about:
//! - Which operation kinds regenerate synchronously
//! - Cross-layer wiring (store + locks + log + composites)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod database;
pub mod dispatcher;
pub mod queue;

pub use background::{BackgroundJobQueue, JobHandler, QueueStats};
pub use database::{
    OperationConfig, OperationsConfig, TransactionLogConfig, Tripod, TripodBuilder, TripodConfig,
    CONFIG_FILE_NAME, DEFAULT_QUEUE,
};
pub use dispatcher::{Dispatcher, JobExecutor};
pub use queue::{JobQueue, JobReport, MemoryJobQueue, RegenerationJob};
