//! Error taxonomy for the unit of work.
//!
//! Only [`FlushError`] (and the [`StorageError`] it wraps) can surface during
//! normal request processing. Recording and discarding mutations never fail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Failures reported by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// None of the configured hosts accepted a connection.
    #[error("Storage connection failed: {0}")]
    Connect(String),

    /// The backend rejected or failed to execute a write.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// The entity could not be turned into a storable document.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An entity kind or key that cannot be used as a storage identifier.
    #[error("Invalid storage identifier: {0}")]
    InvalidIdentifier(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Raised when the current session is requested outside a request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    /// No request context is active on the calling task.
    #[error("no request context is active; install the unit-of-work layer")]
    OutsideContext,
}

/// A flush stopped at the first failed mutation.
#[derive(Debug, thiserror::Error)]
#[error("flush failed with {pending} mutation(s) still pending: {source}")]
pub struct FlushError {
    /// The storage failure of the mutation at the head of the queue.
    #[source]
    pub source: StorageError,
    /// Mutations that were not executed, including the failed one.
    pub pending: usize,
}

/// Response extension marking a dispatch that ended in a handler error.
///
/// The lifecycle layer skips the flush when it sees this marker. The crate's
/// [`Error`] inserts it automatically; custom error types can insert it too.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerFailed;

/// Application-facing error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required setup values absent or malformed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Session access outside a request context.
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// A write failed while flushing the request's session.
    #[error(transparent)]
    Flush(#[from] FlushError),

    /// A storage call made directly by a handler failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request could not be processed as sent.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Result type alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// HTTP status reported to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Binding(_) | Self::Flush(_) | Self::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(name: "uow.request.error", error = %self, "request failed");
        }
        // Internal details stay in the log; clients only see the status text.
        let body = if status.is_server_error() {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.to_string()
        };
        let mut response = (status, body).into_response();
        response.extensions_mut().insert(HandlerFailed);
        response
    }
}
