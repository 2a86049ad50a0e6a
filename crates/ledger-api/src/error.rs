use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ledger_core::wire::{ConflictBody, ConflictDetails, ErrorBody};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Version conflict: client={:?}, server={}", .0.client_version, .0.server_version)]
    Conflict(Box<ConflictDetails>),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if let Self::Conflict(details) = self {
            return (status, Json(ConflictBody::new(*details))).into_response();
        }
        if status.is_server_error() {
            tracing::error!("{self}");
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Invalid(message) => Self::BadRequest(message),
            StoreError::Conflict {
                client_version,
                server_version,
                current,
            } => Self::Conflict(Box::new(ConflictDetails {
                client_version: Some(client_version),
                server_version,
                current_data: current.to_json(),
            })),
            StoreError::Sqlite(error) => Self::internal(error.to_string()),
            StoreError::Serialization(error) => Self::internal(error.to_string()),
        }
    }
}
