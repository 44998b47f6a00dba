//! HTTP error mapping.

use attention_core::domain::SessionRefError;
use attention_core::ports::ForwardError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Request failures, rendered as `{ok: false, detail}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed form, undecodable image.
    #[error("{0}")]
    BadRequest(String),
    /// Neither or both session ids.
    #[error(transparent)]
    Session(#[from] SessionRefError),
    /// Landmark detector could not run.
    #[error("landmark detector unavailable: {0}")]
    Detector(String),
    /// Backend did not take the event.
    #[error("event not forwarded: {0}")]
    Forward(#[from] ForwardError),
    /// Worker task died.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Session(_) => StatusCode::BAD_REQUEST,
            Self::Detector(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Forward(ForwardError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Forward(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.to_string();
        if status.is_server_error() {
            warn!(status = status.as_u16(), "{detail}");
        }
        (status, Json(json!({ "ok": false, "detail": detail }))).into_response()
    }
}
