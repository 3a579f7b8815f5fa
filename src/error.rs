//! Error types for the gateway core

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Comprehensive error types for the gateway core
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Missing or malformed identifier, unsafe path, unknown op type
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Artifact key or run identifier absent from store/index
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller does not own the referenced project
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Origin read/write failure, transient database error; upper layer may retry
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Provider-reported terminal failure; never retried
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Operation aborted by cancellation
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Worker not known to the resolver
    #[error("Worker {0} not found")]
    WorkerNotFound(String),

    /// Run identifier not registered
    #[error("Run {0} not found")]
    RunNotFound(String),

    /// State persistence error (disk index, sled, snapshot files)
    #[error("State persistence error: {0}")]
    StatePersistence(String),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether a retry by the caller could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_) | GatewayError::Timeout)
    }

    /// Whether the error represents a logical miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::NotFound(_) | GatewayError::RunNotFound(_)
        )
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::StatePersistence(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::StatePersistence(format!("JSON error: {}", err))
    }
}

impl From<sled::Error> for GatewayError {
    fn from(err: sled::Error) -> Self {
        GatewayError::StatePersistence(format!("Database error: {}", err))
    }
}
