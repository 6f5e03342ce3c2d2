//! Outward-facing error mapping.
//!
//! Only request-fatal conditions become HTTP errors. Guard blocks and
//! provider failures are pipeline outcomes carried in the normal response
//! body, never status codes.

use aegis_core::GatewayError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors that terminate a request at the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or invalid credential.
    Auth(String),
    /// Malformed or out-of-bounds input.
    Validation(String),
    /// The caller exceeded its request rate.
    RateLimited,
    /// Anything unexpected. The body is generic; detail goes to the log.
    Internal,
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Auth { message } => Self::Auth(message),
            GatewayError::Validation { message } => Self::Validation(message),
            other => {
                tracing::error!(error = %other, "internal failure surfaced to HTTP layer");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Auth(message) => (StatusCode::UNAUTHORIZED, message),
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate limit exceeded".to_string(),
            ),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
