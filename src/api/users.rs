//! Account and session endpoints.
//!
//! - POST `/registration` - Mail an activation code, return the activation token
//! - POST `/activate-user` - Create the identity from an activation token and code
//! - POST `/login` - Email/password login, sets both session cookies
//! - POST `/social-auth` - Find-or-create a social identity and log it in
//! - POST `/logout` - End the session and clear cookies
//! - GET `/refresh` - Rotate both tokens using the refresh cookie
//! - GET `/me` - Current session snapshot
//! - PUT `/update-user-info` - Change name and/or email
//! - PUT `/update-user-password` - Change password

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use crate::auth::{
    ApiAuthError, Auth, AuthErrorKind, CookiePolicy, REFRESH_COOKIE_NAME, get_cookie,
    is_authenticated,
};
use crate::db::{Avatar, Database, Identity, is_unique_violation};
use crate::impl_has_auth_backend;
use crate::password::verify_password_blocking;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_registration};
use crate::registration::{
    Registrar, hash_password_blocking, validate_email, validate_name, validate_password,
};
use crate::session::{IssuedSession, SessionManager, SessionSnapshot};

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub sessions: SessionManager,
    pub cookies: CookiePolicy,
    pub registrar: Registrar,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    let registration_router = Router::new()
        .route("/registration", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_registration,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .route("/social-auth", post(social_auth))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let public_router = Router::new()
        .route("/activate-user", post(activate))
        .route("/refresh", get(refresh))
        .with_state(state.clone());

    // The extractors below reuse the principal attached by this layer.
    let account_router = Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/update-user-info", put(update_info))
        .route("/update-user-password", put(update_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            is_authenticated::<UsersState>,
        ))
        .with_state(state);

    Router::new()
        .merge(registration_router)
        .merge(login_router)
        .merge(public_router)
        .merge(account_router)
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: &'static str,
}

#[derive(Serialize)]
struct UserResponse {
    success: bool,
    user: SessionSnapshot,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    success: bool,
    user: SessionSnapshot,
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    status: &'static str,
    access_token: String,
}

/// Body and Set-Cookie headers for a freshly issued session.
fn session_response(cookies: CookiePolicy, issued: IssuedSession) -> impl IntoResponse {
    let [access_cookie, refresh_cookie] = cookies.session_cookies(&issued.tokens);
    (
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Json(LoginResponse {
            success: true,
            user: issued.user,
            access_token: issued.tokens.access.token,
        }),
    )
}

#[derive(Deserialize)]
struct RegistrationRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationResponse {
    success: bool,
    message: String,
    activation_token: String,
}

async fn register(
    State(state): State<UsersState>,
    Json(payload): Json<RegistrationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();
    let token = state
        .registrar
        .register(&payload.name, email, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            success: true,
            message: format!(
                "Please check your email {} to activate your account",
                email
            ),
            activation_token: token.token,
        }),
    ))
}

#[derive(Deserialize)]
struct ActivationRequest {
    activation_token: String,
    activation_code: String,
}

async fn activate(
    State(state): State<UsersState>,
    Json(payload): Json<ActivationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .registrar
        .activate(&payload.activation_token, payload.activation_code.trim())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            success: true,
            message: "Account activated, you can now log in",
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(
    State(state): State<UsersState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Please enter email and password"));
    }

    let identity = state
        .db
        .identities()
        .find_by_email(email)
        .await
        .db_err("Failed to look up identity")?;

    let issued = state
        .sessions
        .login_with_password(identity, &payload.password)
        .await
        .map_err(|e| ApiError::session(e, state.cookies))?;

    Ok(session_response(state.cookies, issued))
}

#[derive(Deserialize)]
struct SocialAuthRequest {
    email: String,
    name: String,
    avatar: Option<Avatar>,
}

async fn social_auth(
    State(state): State<UsersState>,
    Json(payload): Json<SocialAuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = state
        .registrar
        .social_identity(payload.email.trim(), &payload.name, payload.avatar)
        .await?;

    let issued = state
        .sessions
        .login(&identity)
        .await
        .map_err(|e| ApiError::session(e, state.cookies))?;

    Ok(session_response(state.cookies, issued))
}

async fn logout(
    State(state): State<UsersState>,
    auth: Auth,
) -> Result<impl IntoResponse, ApiError> {
    state
        .sessions
        .logout(&auth.user.id)
        .await
        .map_err(|e| ApiError::session(e, state.cookies))?;

    let [clear_access, clear_refresh] = state.cookies.clear_cookies();
    Ok((
        AppendHeaders([(SET_COOKIE, clear_access), (SET_COOKIE, clear_refresh)]),
        Json(MessageResponse {
            success: true,
            message: "Logged out successfully",
        }),
    ))
}

async fn refresh(
    State(state): State<UsersState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let refresh_token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ApiError::Auth(ApiAuthError::new(
                AuthErrorKind::NotAuthenticated,
                state.cookies,
            ))
        })?;

    let issued = state
        .sessions
        .refresh(refresh_token)
        .await
        .map_err(|e| ApiError::session(e, state.cookies))?;

    let [access_cookie, refresh_cookie] = state.cookies.session_cookies(&issued.tokens);
    Ok((
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Json(RefreshResponse {
            status: "success",
            access_token: issued.tokens.access.token,
        }),
    ))
}

async fn me(auth: Auth) -> impl IntoResponse {
    Json(UserResponse {
        success: true,
        user: auth.into_inner().user,
    })
}

/// Load the authoritative identity behind a session.
async fn current_identity(state: &UsersState, subject_id: &str) -> Result<Identity, ApiError> {
    state
        .db
        .identities()
        .find_by_id(subject_id)
        .await
        .db_err("Failed to get identity")?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Persist an identity change and mirror it into the session record.
async fn save_and_sync(state: &UsersState, identity: &Identity) -> Result<(), ApiError> {
    match state.db.identities().save(identity).await {
        Ok(true) => {}
        Ok(false) => return Err(ApiError::not_found("User not found")),
        Err(e) if is_unique_violation(&e) => return Err(ApiError::DuplicateIdentity),
        Err(e) => return Err(ApiError::db_error("Failed to save identity", e)),
    }

    state
        .sessions
        .update_snapshot(identity)
        .await
        .map_err(|e| ApiError::session(e, state.cookies))?;
    Ok(())
}

#[derive(Deserialize)]
struct UpdateInfoRequest {
    name: Option<String>,
    email: Option<String>,
}

async fn update_info(
    State(state): State<UsersState>,
    auth: Auth,
    Json(payload): Json<UpdateInfoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut identity = current_identity(&state, &auth.user.id).await?;

    if let Some(email) = payload.email.as_deref().map(str::trim) {
        if !email.eq_ignore_ascii_case(&identity.email) {
            validate_email(email)?;
            let taken = state
                .db
                .identities()
                .find_by_email(email)
                .await
                .db_err("Failed to check email")?;
            if taken.is_some() {
                return Err(ApiError::DuplicateIdentity);
            }
        }
        identity.email = email.to_string();
    }

    if let Some(name) = payload.name.as_deref() {
        validate_name(name)?;
        identity.name = name.trim().to_string();
    }

    save_and_sync(&state, &identity).await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            success: true,
            user: SessionSnapshot::from(&identity),
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePasswordRequest {
    old_password: Option<String>,
    new_password: Option<String>,
}

async fn update_password(
    State(state): State<UsersState>,
    auth: Auth,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(old_password), Some(new_password)) = (payload.old_password, payload.new_password)
    else {
        return Err(ApiError::bad_request(
            "Please enter your current and new password",
        ));
    };

    let mut identity = current_identity(&state, &auth.user.id).await?;

    if identity.password_hash.is_none() {
        return Err(ApiError::bad_request(
            "This account signs in without a password",
        ));
    }
    let matches = verify_password_blocking(Some(&identity), &old_password)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Password verification task failed");
            ApiError::internal("Internal server error")
        })?;
    if !matches {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }
    validate_password(&new_password)?;

    identity.password_hash = Some(hash_password_blocking(&new_password).await?);
    save_and_sync(&state, &identity).await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            success: true,
            user: SessionSnapshot::from(&identity),
        }),
    ))
}
