//! Admin API endpoints.
//!
//! All endpoints require admin role.

use axum::{
    Json, Router,
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, put},
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ResultExt};
use crate::auth::{AdminOnly, AllowedRoles, Auth, CookiePolicy, require_roles};
use crate::db::{Database, Role};
use crate::impl_has_auth_backend;
use crate::session::{SessionManager, SessionSnapshot};

/// State for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub db: Database,
    pub sessions: SessionManager,
    pub cookies: CookiePolicy,
}

impl_has_auth_backend!(AdminState);

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/get-users", get(list_users))
        .route("/update-user-role", put(update_role))
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), AllowedRoles::of::<AdminOnly>()),
            require_roles::<AdminState>,
        ))
        .with_state(state)
}

#[derive(Serialize)]
struct UsersResponse {
    success: bool,
    users: Vec<SessionSnapshot>,
}

/// List all identities, newest first.
async fn list_users(
    State(state): State<AdminState>,
    _auth: Auth<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .db
        .identities()
        .list()
        .await
        .db_err("Failed to list users")?;

    Ok(Json(UsersResponse {
        success: true,
        users: users.iter().map(SessionSnapshot::from).collect(),
    }))
}

#[derive(Deserialize)]
struct UpdateRoleRequest {
    id: String,
    role: String,
}

#[derive(Serialize)]
struct UserResponse {
    success: bool,
    user: SessionSnapshot,
}

/// Change a user's role. A live session picks the new role up immediately.
async fn update_role(
    State(state): State<AdminState>,
    auth: Auth<AdminOnly>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role: Role = payload
        .role
        .parse()
        .map_err(|_| ApiError::bad_request("Role must be 'user' or 'admin'"))?;

    let updated = state
        .db
        .identities()
        .set_role(&payload.id, role)
        .await
        .db_err("Failed to update role")?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    let identity = state
        .db
        .identities()
        .find_by_id(&payload.id)
        .await
        .db_err("Failed to get identity")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    state
        .sessions
        .update_snapshot(&identity)
        .await
        .map_err(|e| ApiError::session(e, state.cookies))?;

    tracing::info!(
        admin_id = %auth.user.id,
        subject_id = %identity.id,
        role = role.as_str(),
        "Role updated"
    );

    Ok(Json(UserResponse {
        success: true,
        user: SessionSnapshot::from(&identity),
    }))
}
