use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error returned by the JSON endpoints.
///
/// Only `message` reaches the client; `internal_error` is logged.
#[derive(Debug, Error)]
#[error("HTTP {status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    #[source]
    pub internal_error: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            internal_error: None,
        }
    }

    pub fn with_internal<E>(status: StatusCode, message: impl Into<String>, internal: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            status,
            message: message.into(),
            internal_error: Some(Box::new(internal)),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal<E>(internal: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::with_internal(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            internal,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Some(internal) = &self.internal_error {
            error!("{} ({})", self.message, internal);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
