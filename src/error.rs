// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    /// The user already has an ONGOING mock exam.
    AlreadyOngoing,

    /// The user has no ONGOING mock exam.
    NoOngoingSession,

    /// The submitted answer targets a question that is not the session's current one.
    QuestionMismatch {
        expected: Option<i64>,
        submitted: i64,
    },

    /// The session was finished before the operation could apply.
    SessionFinished,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::NoOngoingSession => StatusCode::NOT_FOUND,
            AppError::AlreadyOngoing
            | AppError::QuestionMismatch { .. }
            | AppError::SessionFinished => StatusCode::CONFLICT,
        }
    }
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => msg,
            AppError::AlreadyOngoing => "You already have an ongoing mock exam".to_string(),
            AppError::NoOngoingSession => "You aren't currently doing a mock exam".to_string(),
            AppError::QuestionMismatch { expected, submitted } => match expected {
                Some(expected) => format!(
                    "Question {} is not the current question (expected {})",
                    submitted, expected
                ),
                None => format!("Question {} is not the current question", submitted),
            },
            AppError::SessionFinished => "This mock exam is already finished".to_string(),
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
