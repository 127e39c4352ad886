//! Error types bridging domain errors and HTTP responses.
//!
//! Domain modules define their own `thiserror` enums; this module defines
//! the single [`AppError`] that handlers return, implementing Axum's
//! `IntoResponse`. The error taxonomy follows the gateway contract:
//! validation (400), auth (401/403), conflict (409), not-found (404) and
//! transient (500). Conflict and validation codes surface verbatim to the
//! client, infrastructure faults are logged and collapsed to a retryable
//! 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Application error for HTTP handlers.
///
/// Carries the HTTP status, the machine-readable error code surfaced to the
/// client, a human-readable message, and an optional internal source kept
/// out of the response body.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, code: String, message: String) -> Self {
        Self {
            status,
            code,
            message,
            source: None,
        }
    }

    /// Attach an internal source error (logged, never exposed).
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code.into(), message.into())
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code.into(), message.into())
    }

    /// 403 Forbidden.
    #[must_use]
    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code.into(), message.into())
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code.into(), message.into())
    }

    /// 409 Conflict. Deterministic from state; the client may retry after
    /// state changes.
    #[must_use]
    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code.into(), message.into())
    }

    /// 500 transient infrastructure fault; safe to retry from the client.
    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            code.into(),
            message.into(),
        )
    }

    /// The machine-readable code surfaced to the client.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    error = %source,
                    "internal error"
                );
            } else {
                tracing::error!(status = %self.status, code = %self.code, message = %self.message, "internal error");
            }
        }

        let body = ErrorBody {
            success: false,
            error: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("INTERNAL_ERROR", "An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = AppError::conflict("QUOTA_EXCEEDED", "Workshop is already full");
        assert_eq!(err.to_string(), "[QUOTA_EXCEEDED] Workshop is already full");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn constructors_map_statuses() {
        assert_eq!(
            AppError::bad_request("INVALID_REQUEST", "").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::unauthorized("UNAUTHORIZED", "").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::forbidden("NOT_ACTIVE", "").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::not_found("ENROLLMENT_NOT_FOUND", "").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::internal("QUEUE_ERROR", "").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
