//! HTTP-facing error wrapper.
//!
//! [`AppError`] adapts the crate-wide [`shelf_core::Error`] into an axum
//! response: a JSON body with a stable machine-readable code, the status
//! from [`shelf_core::Error::http_status`], and the request ID when the
//! middleware attached one. Server-side failures are logged here, at the
//! single point where they leave the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use shelf_core::Error;

/// An error on its way out as an HTTP response.
#[derive(Debug)]
pub struct AppError {
    inner: Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Stable machine-readable code for the error kind.
    fn code(&self) -> &'static str {
        match &self.inner {
            Error::NotFound { .. } => "not_found",
            Error::Validation(_) => "validation_error",
            Error::Database { .. } => "database_error",
            Error::Io { .. } => "io_error",
            Error::Citation(_) => "citation_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl From<Error> for AppError {
    fn from(inner: Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                error = %self.inner,
                request_id = self.request_id.as_deref(),
                "request failed"
            );
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": self.code(),
            "request_id": self.request_id,
        });

        (status, Json(body)).into_response()
    }
}
