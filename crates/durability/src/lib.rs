//! Durability layer for Tripod
//!
//! This crate owns the transaction log:
//!
//! - TransactionRecord: one logged write attempt with before/after images
//! - TransactionLog: the log abstraction, with in-memory and file-backed
//!   implementations
//! - File framing: length-prefixed, CRC32-checked MessagePack records
//! - Replay: rebuild the store from the newest post-image per subject

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file_log;
pub mod log;
pub mod record;
pub mod replay;

pub use file_log::{encode_frame, scan_frames, FileTransactionLog, ScanResult, FRAME_HEADER_SIZE};
pub use log::{MemoryTransactionLog, TransactionLog, APPEND_FAILED};
pub use record::{TransactionError, TransactionRecord, TransactionStatus};
pub use replay::{replay, ReplayStats};
