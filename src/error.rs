// src/error.rs

use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::utils::storage::ImageStoreError;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error (includes aborted transactions)
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden (authenticated, but not allowed)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., duplicate username or duplicate vote)
    Conflict(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg,
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<ImageStoreError> for AppError {
    fn from(err: ImageStoreError) -> Self {
        match err {
            ImageStoreError::NotAnImage => {
                AppError::BadRequest("Uploaded file is not a supported image".to_string())
            }
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

/// Returns the violated constraint name when `err` is a unique violation.
pub fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}
