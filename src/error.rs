//! Error handling module for vmtend
//!
//! Library code returns `VmTendError`; the binary and config loader use
//! `anyhow` with context on top of it.

use thiserror::Error;

/// Main error type for the maintenance engine
#[derive(Error, Debug)]
pub enum VmTendError {
    /// IO errors (marker files, progress lists, mount table)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A command could not be spawned or waited on
    #[error("Command error: {0}")]
    Command(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, VmTendError>;

impl VmTendError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }
}
