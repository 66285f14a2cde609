//! Typed errors shared by every hrsync crate.

use thiserror::Error;

/// Errors raised while compiling, reading, formatting or writing records.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing binding metadata, unknown operator, unsupported resource or
    /// unknown connector. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A prefilter condition uses an operator its field does not allow.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resolving records from event ids failed for a whole batch.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// A formatter or unified conversion failed for a record.
    #[error("format error: {0}")]
    Format(String),

    /// The connector's transport failed while reading or writing.
    #[error("connector error: {0}")]
    Connector(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        SyncError::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        SyncError::Validation(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        SyncError::Format(msg.into())
    }

    /// Configuration and validation errors abort a run before or during I/O.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(self, SyncError::Configuration(_) | SyncError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
