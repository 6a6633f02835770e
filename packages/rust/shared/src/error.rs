//! Error types for Recast.
//!
//! Library crates use [`RecastError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Recast operations.
#[derive(Debug, thiserror::Error)]
pub enum RecastError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The text-generation oracle could not be reached or refused the call.
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Structured-output parsing error that could not be recovered locally.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Rejected input (empty document, zero target, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// No job exists with the given id.
    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// The job state machine refused a transition.
    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Another worker currently holds the job's lease.
    #[error("job {job_id} is claimed by worker {owner}")]
    JobClaimed { job_id: String, owner: String },

    /// Cancellation was requested before the next chunk was scheduled.
    #[error("job {job_id} cancelled before chunk {next_chunk}")]
    Cancelled { job_id: String, next_chunk: u32 },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RecastError>;

impl RecastError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap any storage-layer error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
