//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::auth::{ApiAuthError, CookiePolicy};
use crate::registration::RegistrationError;
use crate::session::SessionError;

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    DuplicateIdentity,
    ActivationCodeMismatch,
    /// Activation token past its lifetime. Same code as an expired session
    /// token, but a 400: no session is involved.
    TokenExpired,
    /// Activation token that does not decode or verify.
    TokenMalformed,
    Internal(String),
    /// Session failures keep their own codes and cookie handling.
    Auth(ApiAuthError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Session failure, with the cookie policy needed to clear dead cookies.
    pub fn session(e: SessionError, cookies: CookiePolicy) -> Self {
        Self::Auth(ApiAuthError::from_session(e, cookies))
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal("Database error".into())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::DuplicateIdentity => (StatusCode::CONFLICT, "duplicate_identity"),
            ApiError::ActivationCodeMismatch => {
                (StatusCode::BAD_REQUEST, "activation_code_mismatch")
            }
            ApiError::TokenExpired => (StatusCode::BAD_REQUEST, "token_expired"),
            ApiError::TokenMalformed => (StatusCode::BAD_REQUEST, "token_malformed"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ApiError::Auth(e) => (e.kind.status_code(), e.kind.code()),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::InvalidInput(msg) => ApiError::bad_request(msg),
            RegistrationError::DuplicateIdentity => ApiError::DuplicateIdentity,
            RegistrationError::ActivationCodeMismatch => ApiError::ActivationCodeMismatch,
            RegistrationError::ActivationExpired => ApiError::TokenExpired,
            RegistrationError::ActivationInvalid => ApiError::TokenMalformed,
            RegistrationError::Mail(e) => {
                error!("Failed to send activation mail: {}", e);
                ApiError::internal("Failed to send activation email")
            }
            RegistrationError::Database(e) => ApiError::db_error("Registration query failed", e),
            other => {
                error!("Registration failed: {}", other);
                ApiError::internal("Internal server error")
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Internal(msg) => msg,
            ApiError::DuplicateIdentity => "Email is already registered".to_string(),
            ApiError::ActivationCodeMismatch => "Invalid activation code".to_string(),
            ApiError::TokenExpired => {
                "Activation code has expired, please register again".to_string()
            }
            ApiError::TokenMalformed => "Invalid activation token".to_string(),
            ApiError::Auth(e) => return e.into_response(),
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}
