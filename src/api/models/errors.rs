//! Unified API error type
//!
//! Service-layer errors carry a stable code plus a message and convert to
//! transport-specific representations at the edge.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for service-layer operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Stable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Optional structured details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// HTTP status for this error code
    #[cfg(feature = "http")]
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.code.as_str() {
            "INVALID_ARGUMENT" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "PERMISSION_DENIED" => StatusCode::FORBIDDEN,
            "CANCELLED" => StatusCode::CONFLICT,
            "TIMEOUT" => StatusCode::REQUEST_TIMEOUT,
            "UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let code = match &err {
            GatewayError::InvalidArgument(_) => "INVALID_ARGUMENT",
            GatewayError::NotFound(_)
            | GatewayError::RunNotFound(_)
            | GatewayError::WorkerNotFound(_) => "NOT_FOUND",
            GatewayError::PermissionDenied(_) => "PERMISSION_DENIED",
            GatewayError::Cancelled => "CANCELLED",
            GatewayError::Timeout => "TIMEOUT",
            GatewayError::Transient(_) => "UNAVAILABLE",
            GatewayError::Permanent(_)
            | GatewayError::StatePersistence(_)
            | GatewayError::Config(_)
            | GatewayError::Internal(_) => "INTERNAL",
        };
        ApiError::new(code, err.to_string())
    }
}
