//! Typed errors for the connectors crate.

use std::fmt;

use hrsync_core::SyncError;

/// Errors raised by connector transports and stores.
#[derive(Debug)]
pub enum ConnectorError {
    /// Failed to reach the external system.
    ConnectionFailed(String),
    /// The external system answered with an error status.
    RequestFailed { status: u16, message: String },
    /// The response body did not have the expected shape.
    InvalidResponse(String),
    /// Reading or writing the local store file failed.
    StorageFailed(String),
    /// Invalid or missing configuration.
    ConfigError(String),
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            ConnectorError::RequestFailed { status, message } => {
                write!(f, "request failed with status {}: {}", status, message)
            }
            ConnectorError::InvalidResponse(msg) => write!(f, "invalid response: {}", msg),
            ConnectorError::StorageFailed(msg) => write!(f, "storage failed: {}", msg),
            ConnectorError::ConfigError(msg) => write!(f, "config error: {}", msg),
        }
    }
}

impl std::error::Error for ConnectorError {}

impl From<reqwest::Error> for ConnectorError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ConnectorError::RequestFailed {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None if e.is_decode() => ConnectorError::InvalidResponse(e.to_string()),
            None => ConnectorError::ConnectionFailed(e.to_string()),
        }
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(e: std::io::Error) -> Self {
        ConnectorError::StorageFailed(e.to_string())
    }
}

impl From<url::ParseError> for ConnectorError {
    fn from(e: url::ParseError) -> Self {
        ConnectorError::ConfigError(e.to_string())
    }
}

impl From<ConnectorError> for SyncError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::ConfigError(msg) => SyncError::Configuration(msg),
            other => SyncError::Connector(other.to_string()),
        }
    }
}
