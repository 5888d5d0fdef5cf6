//! Crate-wide error type and HTTP response conversion
//!
//! Error kinds follow spec §7: `Transient`, `Invalid` (400), `NotFound`
//! (404), `Conflict` (409), `Permission` (401/403), `Fatal` (startup only,
//! never converted to a response). Task-handler errors, agent-stream
//! errors, and audit-pipeline errors are captured by their owning
//! subsystem and never reach this conversion path (spec §7 propagation
//! policy) — this type is for the thin HTTP surface only.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error — fatal at startup
    #[error("configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Database error
    #[error("database error: {0}")]
    Database(Box<sqlx::Error>),

    /// Redis error (leader lease, downstream backpressure counters)
    #[error("redis error: {0}")]
    Redis(Box<redis::RedisError>),

    /// NATS error (alert fan-out)
    #[error("nats error: {0}")]
    Nats(String),

    /// gRPC transport error
    #[error("grpc transport error: {0}")]
    Grpc(Box<tonic::transport::Error>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Retry-appropriate transient failure (DB deadlock, upstream stall)
    #[error("transient error: {0}")]
    Transient(String),

    /// 401/403 — authentication/authorization failure
    #[error("permission denied: {0}")]
    Permission(String),

    /// 404
    #[error("not found: {0}")]
    NotFound(String),

    /// 400 — validation/invalid input
    #[error("invalid request: {0}")]
    Invalid(String),

    /// 409 — named conflicts: task-already-running, trigger-queue-full, etc.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Startup-time error that should abort the process
    #[error("fatal error: {0}")]
    Fatal(String),

    /// 500 — internal/unexpected
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn conflict_already_running() -> Self {
        Error::Conflict("already-running".into())
    }

    pub fn conflict_trigger_queue_full() -> Self {
        Error::Conflict("trigger-queue-full".into())
    }
}

/// Machine-readable error body returned to HTTP clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            status: status.as_u16(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            Error::Config(_) | Error::Fatal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "FATAL"),
            Error::Database(_) | Error::Redis(_) | Error::Grpc(_) | Error::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
            Error::Nats(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            Error::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "TRANSIENT"),
            Error::Permission(_) => (StatusCode::FORBIDDEN, "PERMISSION"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Invalid(_) => (StatusCode::BAD_REQUEST, "INVALID"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };

        tracing::error!(kind, "{}", self);

        let body = ErrorResponse::new(status, kind, self.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(Box::new(e))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Database(Box::new(e))
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Redis(Box::new(e))
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        Error::Grpc(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        let resp = Error::conflict_already_running().into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = Error::NotFound("task".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
