//! Error taxonomy shared by the service and its HTTP boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ErrorResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Boundary level errors.
///
/// `Display` carries the full detail for logs; clients only ever see
/// [`AppError::public_message`].
#[derive(Debug, Error)]
pub enum AppError {
    /// The logical database key is not registered.
    #[error("Database '{0}' not found")]
    UnknownDatabaseKey(String),

    /// Opening a warehouse connection failed.
    #[error("Failed to connect to database '{key}': {message}")]
    ConnectionFailure { key: String, message: String },

    /// Describing a table failed for any reason.
    #[error("Table '{0}' not found or inaccessible")]
    TableNotFound(String),

    /// Reading table rows failed for any reason.
    #[error("Failed to fetch data from table '{0}'")]
    FetchFailure(String),

    /// Request parameters were rejected.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Startup configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnknownDatabaseKey(_)
            | AppError::TableNotFound(_)
            | AppError::FetchFailure(_) => StatusCode::NOT_FOUND,
            AppError::ConnectionFailure { .. } => StatusCode::BAD_GATEWAY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UnknownDatabaseKey(_) => "UNKNOWN_DATABASE",
            AppError::ConnectionFailure { .. } => "CONNECTION_FAILED",
            AppError::TableNotFound(_) => "TABLE_NOT_FOUND",
            AppError::FetchFailure(_) => "FETCH_FAILED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Message safe to return to clients. Driver detail is stripped.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ConnectionFailure { key, .. } => {
                format!("Failed to connect to database '{}'", key)
            }
            AppError::Config(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }
        let body = ErrorResponse::new(self.code(), self.public_message());
        (status, Json(body)).into_response()
    }
}

/// Failures of the metadata discovery operations.
///
/// The HTTP boundary degrades these into empty results; the core only
/// reports them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("unknown database key '{0}'")]
    UnknownDatabaseKey(String),

    #[error("connection to '{key}' failed: {message}")]
    Connection { key: String, message: String },

    #[error("{operation} failed for '{key}': {message}")]
    Query {
        operation: &'static str,
        key: String,
        message: String,
    },
}

impl DiscoveryError {
    /// Lifts a registry error into the discovery taxonomy.
    pub fn from_acquire(key: &str, err: AppError) -> Self {
        match err {
            AppError::UnknownDatabaseKey(k) => DiscoveryError::UnknownDatabaseKey(k),
            AppError::ConnectionFailure { key, message } => {
                DiscoveryError::Connection { key, message }
            }
            other => DiscoveryError::Connection {
                key: key.to_string(),
                message: other.to_string(),
            },
        }
    }
}
