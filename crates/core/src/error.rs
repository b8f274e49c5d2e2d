//! Error types for the triple store
//!
//! Every pipeline step returns `Result<T>`; callers pattern-match on the
//! variant (or on `ErrorKind`) instead of catching panics. We use
//! `thiserror` for the `Display` and `Error` implementations.

use crate::types::SubjectId;
use std::io;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy
#[derive(Debug, Error)]
pub enum Error {
    /// Could not take every lock a transaction needed
    #[error("Did not obtain locks on documents: {subject} is locked")]
    LockConflict {
        /// First subject that was already locked
        subject: SubjectId,
    },

    /// The stored document changed since the caller's snapshot
    #[error("Interleaving update on {subject}: {reason}")]
    WriteConflict {
        /// Subject whose document moved on
        subject: SubjectId,
        /// What did not match
        reason: String,
    },

    /// A predicate holds more values than its configured cardinality
    #[error("Cardinality violation on {subject}: {predicate} has {actual} values, at most {max} allowed")]
    CardinalityViolation {
        /// Offending subject
        subject: SubjectId,
        /// Offending predicate
        predicate: String,
        /// Configured bound
        max: usize,
        /// Values after the merge
        actual: usize,
    },

    /// Malformed configuration or specification
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The document store rejected an operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Coarse classification of an `Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See `Error::LockConflict`
    LockConflict,
    /// See `Error::WriteConflict`
    WriteConflict,
    /// See `Error::CardinalityViolation`
    CardinalityViolation,
    /// See `Error::Configuration`
    Configuration,
    /// Storage, serialization and I/O failures
    Storage,
    /// See `Error::NotFound`
    NotFound,
}

impl Error {
    /// Classification used by callers deciding how to react
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::LockConflict { .. } => ErrorKind::LockConflict,
            Error::WriteConflict { .. } => ErrorKind::WriteConflict,
            Error::CardinalityViolation { .. } => ErrorKind::CardinalityViolation,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Storage(_) | Error::Serialization(_) | Error::Io(_) => ErrorKind::Storage,
            Error::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// True if re-reading and retrying the same call can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::LockConflict | ErrorKind::WriteConflict)
    }

    /// Shorthand for `Error::Configuration`
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Shorthand for `Error::Storage`
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
