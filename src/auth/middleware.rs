//! Route layers for authentication and role checks.
//!
//! ```ignore
//! Router::new()
//!     .route("/get-users", get(list_users))
//!     .route_layer(from_fn_with_state(
//!         (state.clone(), AllowedRoles::of::<AdminOnly>()),
//!         require_roles::<AppState>,
//!     ))
//!     .route_layer(from_fn_with_state(state.clone(), is_authenticated::<AppState>))
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::errors::ApiAuthError;
use super::extractors::{authenticate_request, check_role};
use super::roles::AllowedRoles;
use super::state::HasAuthBackend;

/// Reject unauthenticated requests and attach the principal as an extension.
pub async fn is_authenticated<S>(
    State(state): State<S>,
    request: Request,
    next: Next,
) -> Result<Response, ApiAuthError>
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    let (parts, body) = request.into_parts();
    let principal = authenticate_request(&parts, &state).await?;
    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Reject requests whose principal lacks an allowed role.
///
/// Authenticates first if `is_authenticated` did not already run, so a
/// failed login always reports 401 before any 403.
pub async fn require_roles<S>(
    State((state, allowed)): State<(S, AllowedRoles)>,
    request: Request,
    next: Next,
) -> Result<Response, ApiAuthError>
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    let (parts, body) = request.into_parts();
    let principal = authenticate_request(&parts, &state).await?;
    let mut request = Request::from_parts(parts, body);
    check_role(&principal, &allowed.0, &state)?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
