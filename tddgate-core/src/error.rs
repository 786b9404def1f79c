//! Error types for tddgate
//!
//! Policy rejections (wrong phase, failing test, regression) are not errors:
//! they are returned as [`crate::workflow::ValidationReport`] values. The
//! variants here are the tooling failures that stop policy from being
//! evaluated at all.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for tddgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for tddgate operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Version-control error
    #[error("Git error: {0}")]
    Git(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No state has been initialized for the scope
    #[error("No TDD state found for {}. Run with --init first.", scope_root.display())]
    NoState { scope_root: PathBuf },

    /// The state file exists but does not describe a valid workflow
    #[error("Corrupt TDD state at {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    /// A phase name that is not part of the workflow
    #[error("Invalid phase: {0}")]
    InvalidPhase(String),

    /// State could not be written
    #[error("Failed to save state: {0}")]
    Persistence(String),

    /// A test command could not be launched
    #[error("Execution error: {0}")]
    Execution(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<git2::Error> for Error {
    fn from(e: git2::Error) -> Self {
        Error::Git(e.message().to_string())
    }
}
