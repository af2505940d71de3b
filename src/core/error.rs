//! Typed error handling for the mockbase server
//!
//! Every service handler returns `Result<_, ServiceError>`. The dispatcher is
//! the single point where errors become HTTP responses: typed variants map to
//! their status codes, anything unexpected is logged server-side and surfaced
//! as an opaque 500.
//!
//! # Error Categories
//!
//! - [`ServiceError::Request`]: malformed input or invalid operation (400)
//! - [`ServiceError::NotFound`]: missing collection or record (404)
//! - [`ServiceError::Conflict`]: duplicate identity on create (409)
//! - [`ServiceError::Authorization`]: action requires authentication (401)
//! - [`ServiceError::Credential`]: authenticated but disallowed, or bad token (403)
//! - [`ServiceError::Service`]: generic typed failure (400)
//! - [`ServiceError::Internal`]: unexpected failure, never detailed to the caller (500)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// The error type shared by all services
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input / invalid operation
    #[error("{0}")]
    Request(String),

    /// Missing collection or record
    #[error("{0}")]
    NotFound(String),

    /// Duplicate identity on create
    #[error("{0}")]
    Conflict(String),

    /// Action requires authentication
    #[error("{0}")]
    Authorization(String),

    /// Authenticated but disallowed, or invalid/missing token
    #[error("{0}")]
    Credential(String),

    /// Generic typed service failure
    #[error("{0}")]
    Service(String),

    /// Unexpected internal failure; logged, never detailed to the caller
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn request() -> Self {
        Self::Request("Request error".to_string())
    }

    pub fn not_found() -> Self {
        Self::NotFound("Resource not found".to_string())
    }

    pub fn credential() -> Self {
        Self::Credential("Forbidden".to_string())
    }

    pub fn authorization() -> Self {
        Self::Authorization("Unauthorized".to_string())
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Request(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Authorization(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Credential(_) => StatusCode::FORBIDDEN,
            ServiceError::Service(_) => StatusCode::BAD_REQUEST,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error envelope returned to REST consumers
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric code, mirrors the HTTP status
    pub code: u16,
    /// Human-readable message
    pub message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Internal details must never reach the caller
            ServiceError::Internal(detail) => {
                tracing::error!(error = %detail, "unhandled service error");
                "Server Error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            code: status.as_u16(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

// Lock poisoning is a bug in handler code, not a client problem.
impl<T> From<std::sync::PoisonError<T>> for ServiceError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ServiceError::Internal(format!("storage lock poisoned: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            ServiceError::request().status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::not_found().status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::authorization().status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::credential().status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn default_messages() {
        assert_eq!(ServiceError::not_found().to_string(), "Resource not found");
        assert_eq!(ServiceError::credential().to_string(), "Forbidden");
    }
}
