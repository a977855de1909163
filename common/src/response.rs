//! API error envelope.
//!
//! Successful responses are endpoint specific; every failure is reported in
//! this one shape.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Error response wrapper.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Always `false`.
    pub success: bool,

    /// Error details.
    pub error: ApiError,

    /// Response metadata.
    pub meta: ResponseMeta,
}

/// API error details.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Error code for client handling (e.g., "VALIDATION_ERROR", "TABLE_NOT_FOUND").
    pub code: String,

    /// Human-readable error message.
    pub message: String,
}

/// Response metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResponseMeta {
    /// Response timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }
}

impl ErrorResponse {
    /// Creates an error response.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ApiError {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_shape() {
        let body = serde_json::to_value(ErrorResponse::new("TABLE_NOT_FOUND", "gone")).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "TABLE_NOT_FOUND");
        assert_eq!(body["error"]["message"], "gone");
        assert!(body["meta"]["timestamp"].is_string());
    }
}
