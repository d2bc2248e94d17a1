//! HTTP API error handling
//!
//! Converts store and request errors to JSON error bodies with matching
//! HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::StoreError;

/// HTTP API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Store(err) if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Store(err) => err.error_type(),
            ApiError::NotFound(_) => "not_found",
            ApiError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }

        let body = json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
            }
        });

        (status, Json(body)).into_response()
    }
}

/// Result type for HTTP handlers
pub type Result<T> = std::result::Result<T, ApiError>;
