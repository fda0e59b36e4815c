//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::cookie::{CookiePolicy, append_set_cookies};
use crate::session::SessionError;

/// Why a request was not let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NotAuthenticated,
    InvalidCredentials,
    TokenMalformed,
    TokenExpired,
    SessionRevoked,
    Forbidden,
    StoreUnavailable,
    Internal,
}

impl AuthErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthErrorKind::NotAuthenticated
            | AuthErrorKind::InvalidCredentials
            | AuthErrorKind::TokenMalformed
            | AuthErrorKind::TokenExpired
            | AuthErrorKind::SessionRevoked => StatusCode::UNAUTHORIZED,
            AuthErrorKind::Forbidden => StatusCode::FORBIDDEN,
            AuthErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthErrorKind::NotAuthenticated => "unauthenticated",
            AuthErrorKind::InvalidCredentials => "invalid_credentials",
            AuthErrorKind::TokenMalformed => "token_malformed",
            AuthErrorKind::TokenExpired => "token_expired",
            AuthErrorKind::SessionRevoked => "session_revoked",
            AuthErrorKind::Forbidden => "forbidden",
            AuthErrorKind::StoreUnavailable => "session_store_unavailable",
            AuthErrorKind::Internal => "internal_error",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthErrorKind::NotAuthenticated => "Please login to access this resource",
            AuthErrorKind::InvalidCredentials => "Invalid email or password",
            AuthErrorKind::TokenMalformed => "Invalid token",
            AuthErrorKind::TokenExpired => "Access token expired, refresh the session",
            AuthErrorKind::SessionRevoked => "Session is no longer active, please login again",
            AuthErrorKind::Forbidden => "You are not allowed to access this resource",
            AuthErrorKind::StoreUnavailable => "Session service unavailable",
            AuthErrorKind::Internal => "Internal server error",
        }
    }

    /// Whether the cookies the client holds are useless and should be dropped.
    fn clears_cookies(&self) -> bool {
        matches!(
            self,
            AuthErrorKind::TokenMalformed | AuthErrorKind::SessionRevoked
        )
    }
}

impl From<&SessionError> for AuthErrorKind {
    fn from(e: &SessionError) -> Self {
        match e {
            SessionError::InvalidCredentials => AuthErrorKind::InvalidCredentials,
            SessionError::TokenExpired => AuthErrorKind::TokenExpired,
            SessionError::TokenMalformed => AuthErrorKind::TokenMalformed,
            SessionError::SessionRevoked => AuthErrorKind::SessionRevoked,
            SessionError::Store(_) => AuthErrorKind::StoreUnavailable,
            SessionError::Issue(_) | SessionError::Task(_) => AuthErrorKind::Internal,
        }
    }
}

/// API authentication error (JSON body, clears cookies when they are dead).
#[derive(Debug)]
pub struct ApiAuthError {
    pub kind: AuthErrorKind,
    cookies: CookiePolicy,
}

impl ApiAuthError {
    pub fn new(kind: AuthErrorKind, cookies: CookiePolicy) -> Self {
        Self { kind, cookies }
    }

    /// Convert a session failure, logging infrastructure errors.
    pub fn from_session(e: SessionError, cookies: CookiePolicy) -> Self {
        match &e {
            SessionError::Store(inner) => {
                tracing::error!("Session store failure: {}", inner);
            }
            SessionError::Issue(inner) => {
                tracing::error!("Failed to issue token: {}", inner);
            }
            SessionError::Task(inner) => {
                tracing::error!("Password verification task failed: {}", inner);
            }
            _ => {}
        }
        Self::new(AuthErrorKind::from(&e), cookies)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
            code: &'static str,
        }

        let mut response = (
            self.kind.status_code(),
            Json(ErrorResponse {
                error: self.kind.message(),
                code: self.kind.code(),
            }),
        )
            .into_response();

        if self.kind.clears_cookies() {
            append_set_cookies(response.headers_mut(), self.cookies.clear_cookies());
        }

        response
    }
}
