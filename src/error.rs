//! Error taxonomy
//!
//! `StoreError` and `LedgerError` describe failures of the collaborators
//! (SQLite, JSON-RPC). `ApiError` is what request handlers return; it maps
//! every failure onto a status code and a stable error code, and never
//! leaks upstream detail to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Ledger (JSON-RPC) errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("rpc transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed log: {0}")]
    Decode(String),
}

/// Errors surfaced to API callers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Session expired")]
    Expired,

    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl ApiError {
    /// Validation failure for a single named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::InvalidToken => "invalid_token",
            ApiError::Expired => "expired",
            ApiError::Upstream(_) => "upstream_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidToken | ApiError::Expired => StatusCode::UNAUTHORIZED,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

/// Error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, field) = match &self {
            ApiError::Validation { field, message } => (message.clone(), Some(field.clone())),
            ApiError::NotFound(what) => (format!("{} not found", what), None),
            ApiError::InvalidToken => ("Invalid token".to_string(), None),
            ApiError::Expired => ("Session expired".to_string(), None),
            ApiError::Upstream(detail) => {
                tracing::error!(error = %detail, "Upstream failure while handling request");
                ("Internal error".to_string(), None)
            }
        };

        let body = Json(ErrorResponse {
            error: self.code(),
            message,
            field,
        });

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
