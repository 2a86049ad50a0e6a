//! Error types for replaying queued mutations.

use serde_json::Value;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// How the orchestrator treats a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Payload rejected locally; never sent, never retried.
    Validation,
    /// Server holds a different version; resolved server-wins.
    Conflict,
    /// Network failure or timeout; retried with backoff.
    Transient,
    /// Anything else; retried once.
    Unknown,
}

/// Errors that can occur while dispatching a mutation.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Payload failed required-field validation.
    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// Server rejected the write because versions differ.
    #[error("version conflict: client={client_version:?}, server={server_version}")]
    Conflict {
        client_version: Option<i64>,
        server_version: i64,
        current_data: Value,
    },

    /// Connection could not be established or was dropped.
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// Server does not know the entity.
    #[error("not found: {0}")]
    NotFound(String),

    /// Non-success status other than 404/409.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Response body did not match the expected envelope.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Local store failure.
    #[error("local store error: {0}")]
    Store(#[from] crate::Error),
}

impl SyncError {
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
            Self::Conflict { .. } => ErrorClass::Conflict,
            Self::Network(_) | Self::Timeout => ErrorClass::Transient,
            Self::NotFound(_) | Self::Server { .. } | Self::InvalidResponse(_) | Self::Store(_) => {
                ErrorClass::Unknown
            }
        }
    }

    /// Returns true if another attempt could succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient | ErrorClass::Unknown)
    }
}
