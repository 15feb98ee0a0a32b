//! API error types and response formatting.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use kubewarn_event_store::StoreError;

/// API error type that converts to an HTTP response with a JSON body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Requested event was never recorded.
    #[error("not found: {0}")]
    NotFound(String),

    /// Live feed cannot accept another subscriber right now.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Event store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            Self::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                Some(msg.clone()),
            ),
            Self::Store(err) => {
                tracing::error!(error = %err, "event store error while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "store_error",
                    Some("the event store could not serve this request".to_owned()),
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_owned(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
