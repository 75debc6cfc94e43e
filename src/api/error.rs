//! API error type and its HTTP mapping.
//!
//! Two error contracts coexist on this surface: authorization failures
//! are transport-level (401, empty body), while scoped-uid misses are
//! body-shaped `{error: ...}` payloads with HTTP 200 and are produced
//! directly by the handlers, not through this type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Credential missing or invalid, or the role set lacks the
    /// required permission.
    #[error("unauthorized")]
    Unauthorized,

    /// The request payload is structurally valid JSON but violates a
    /// protocol rule.
    #[error("{0}")]
    Validation(String),

    /// Storage or other internal failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ApiError::Internal(err) => {
                error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
