use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Whether 500 responses carry the underlying cause. Off by default;
/// services enable it at startup outside production so local clients
/// see the real failure instead of the generic message.
static EXPOSE_ERROR_CAUSES: AtomicBool = AtomicBool::new(false);

pub fn expose_error_causes(enabled: bool) {
    EXPOSE_ERROR_CAUSES.store(enabled, Ordering::Relaxed);
}

fn internal_error_body(cause: &anyhow::Error, expose: bool) -> String {
    if expose {
        cause.to_string()
    } else {
        "Internal server error".to_string()
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Email not verified: {email}")]
    EmailNotVerified { email: String },

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            requires_verification: Option<bool>,
            #[serde(skip_serializing_if = "Option::is_none")]
            email: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let mut requires_verification = None;
        let mut unverified_email = None;

        let (status, error_message, details, retry_after) = match self {
            AppError::ValidationError(err) => (
                StatusCode::BAD_REQUEST,
                "Validation error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None, None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None, None),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None, None),
            AppError::EmailNotVerified { email } => {
                requires_verification = Some(true);
                unverified_email = Some(email);
                (
                    StatusCode::FORBIDDEN,
                    "Email not verified. Please verify your email before logging in.".to_string(),
                    None,
                    None,
                )
            }
            // Clients treat uniqueness violations as plain 400s with the
            // colliding field named in the message.
            AppError::Conflict(err) => (StatusCode::BAD_REQUEST, err.to_string(), None, None),
            AppError::TooManyRequests(msg, retry) => {
                (StatusCode::TOO_MANY_REQUESTS, msg, None, retry)
            }
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    internal_error_body(&err, EXPOSE_ERROR_CAUSES.load(Ordering::Relaxed)),
                    None,
                    None,
                )
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    internal_error_body(&err, EXPOSE_ERROR_CAUSES.load(Ordering::Relaxed)),
                    None,
                    None,
                )
            }
            AppError::InvalidToken(err) => (
                StatusCode::UNAUTHORIZED,
                "Invalid token".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::EmailError(msg) => {
                tracing::error!(error = %msg, "email delivery error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to send verification email".to_string(),
                    None,
                    None,
                )
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    internal_error_body(&err, EXPOSE_ERROR_CAUSES.load(Ordering::Relaxed)),
                    None,
                    None,
                )
            }
        };

        let mut res = (
            status,
            Json(ErrorResponse {
                error: error_message,
                requires_verification,
                email: unverified_email,
                details,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_causes_hidden_unless_exposed() {
        let cause = anyhow::anyhow!("mongo connection reset");
        assert_eq!(internal_error_body(&cause, false), "Internal server error");
        assert_eq!(internal_error_body(&cause, true), "mongo connection reset");
    }
}
