//! Bridge error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors returned to the extension shell.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Bad request.
    #[error("bad request: {0}")]
    BadRequest(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            BridgeError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for bridge handlers.
pub type Result<T> = std::result::Result<T, BridgeError>;
