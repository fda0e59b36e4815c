//! Axum extractors for authentication.

use std::marker::PhantomData;
use std::ops::Deref;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::ip::HasHeadersAndExtensions;
use super::roles::{AnyRole, RoleConstraint, authorize_roles};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Core authentication shared by the extractors and the middleware.
///
/// A principal already attached by `is_authenticated` is reused; otherwise
/// the access token cookie is checked against the session manager. Expired
/// tokens are rejected, never refreshed here.
pub(super) async fn authenticate_request<T, S>(
    source: &T,
    state: &S,
) -> Result<AuthenticatedUser, ApiAuthError>
where
    T: HasHeadersAndExtensions,
    S: HasAuthBackend + Send + Sync,
{
    if let Some(user) = source.extensions().get::<AuthenticatedUser>() {
        return Ok(user.clone());
    }

    let access_token = get_cookie(source.headers(), ACCESS_COOKIE_NAME)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NotAuthenticated, state.cookies()))?;

    let user = state
        .sessions()
        .authenticate(access_token)
        .await
        .map_err(|e| ApiAuthError::from_session(e, state.cookies()))?;

    Ok(AuthenticatedUser { user })
}

/// Second stage: check the principal's role against an allowed set.
pub(super) fn check_role<S: HasAuthBackend>(
    principal: &AuthenticatedUser,
    allowed: &[crate::db::Role],
    state: &S,
) -> Result<(), ApiAuthError> {
    if authorize_roles(principal.user.role, allowed) {
        Ok(())
    } else {
        tracing::debug!(subject_id = %principal.user.id, "Role not allowed");
        Err(ApiAuthError::new(AuthErrorKind::Forbidden, state.cookies()))
    }
}

/// Extractor for endpoints that require authentication and, optionally, a role.
///
/// `Auth` (or `Auth<AnyRole>`) accepts any logged-in user; `Auth<AdminOnly>`
/// additionally rejects non-admins with 403.
pub struct Auth<R: RoleConstraint = AnyRole> {
    principal: AuthenticatedUser,
    _role: PhantomData<R>,
}

impl<R: RoleConstraint> Auth<R> {
    pub fn into_inner(self) -> AuthenticatedUser {
        self.principal
    }
}

impl<R: RoleConstraint> Deref for Auth<R> {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.principal
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = authenticate_request(parts, state).await?;
        check_role(&principal, R::ALLOWED, state)?;
        Ok(Auth {
            principal,
            _role: PhantomData,
        })
    }
}
