//! Unified application error types and conversion helpers.
//! These errors surface only on the REST control routes; the push channels never carry them.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use speaker_client::ClientError;
use thiserror::Error;

/// High-level classification for mapping to client error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed JSON / invalid schema
    Parse,
    /// Request was understood but arguments were invalid or out of range
    Validation,
    /// No active device, or the referenced resource does not exist
    NotFound,
    /// The speaker rejected or failed the request
    Device,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string(self).unwrap_or_else(|_| "unknown".into())
        )
    }
}

/// Core error enum used throughout the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("speaker error: {0}")]
    Device(#[from] ClientError),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Parse(_) => ErrorKind::Parse,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Device(_) => ErrorKind::Device,
        }
    }

    /// Short machine error code string (snake_case) used in REST error bodies.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Parse => "parse_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Device => "device_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Parse | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Device => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Shorthand constructors for common errors.
pub mod err {
    use super::AppError;
    pub fn parse(msg: impl Into<String>) -> AppError {
        AppError::Parse(msg.into())
    }
    pub fn validation(msg: impl Into<String>) -> AppError {
        AppError::Validation(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> AppError {
        AppError::NotFound(msg.into())
    }
}

/// Simple JSON error response for REST endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,   // machine code
    pub message: String, // human readable
}

impl From<&AppError> for ErrorResponse {
    fn from(e: &AppError) -> Self {
        Self {
            error: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "Request failed");
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Macro for early-returning an AppError in functions returning Result<T, AppError>
#[macro_export]
macro_rules! bail_app {
    ($variant:ident, $($arg:tt)*) => {
        return Err($crate::error::AppError::$variant(format!($($arg)*)))
    };
}
