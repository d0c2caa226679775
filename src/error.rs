/// Unified error types for the verification log client
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the client
#[derive(Error, Debug)]
pub enum VerifyLogError {
    /// Local persistent store inaccessible
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    /// Schema migration failed while opening a store
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Remote authority answered with a non-success status
    #[error("Remote rejected request with status {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    /// Transport failure, timeout, or known-offline
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// Remote answered with a body we cannot use
    #[error("Invalid remote data: {0}")]
    InvalidRemoteData(String),

    /// Stored payload could not be parsed back into structured form
    #[error("Deserialization failure: {0}")]
    DeserializationFailure(String),

    /// Scanned payload is missing required fields
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VerifyLogError {
    /// Whether retrying later may succeed without local changes
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VerifyLogError::RemoteRejected { .. } | VerifyLogError::NetworkUnreachable(_)
        )
    }
}

impl From<reqwest::Error> for VerifyLogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            VerifyLogError::InvalidRemoteData(e.to_string())
        } else {
            VerifyLogError::NetworkUnreachable(e.to_string())
        }
    }
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert VerifyLogError to HTTP response
impl IntoResponse for VerifyLogError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            VerifyLogError::InvalidPayload(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidPayload",
                self.to_string(),
            ),
            VerifyLogError::RemoteRejected { .. } | VerifyLogError::NetworkUnreachable(_) => (
                StatusCode::BAD_GATEWAY,
                "RemoteUnavailable",
                self.to_string(),
            ),
            VerifyLogError::InvalidRemoteData(_) => (
                StatusCode::BAD_GATEWAY,
                "InvalidRemoteData",
                self.to_string(),
            ),
            VerifyLogError::StorageUnavailable(_)
            | VerifyLogError::Migration(_)
            | VerifyLogError::Io(_)
            | VerifyLogError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for client operations
pub type VerifyLogResult<T> = Result<T, VerifyLogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(VerifyLogError::NetworkUnreachable("down".into()).is_transient());
        assert!(VerifyLogError::RemoteRejected {
            status: 500,
            body: String::new()
        }
        .is_transient());
        assert!(!VerifyLogError::InvalidRemoteData("bad".into()).is_transient());
        assert!(!VerifyLogError::StorageUnavailable(sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn test_storage_errors_do_not_leak_details() {
        let response = VerifyLogError::StorageUnavailable(sqlx::Error::PoolClosed).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
