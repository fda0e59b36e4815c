mod admin;
mod error;
mod users;

use axum::{Json, Router, http::StatusCode, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;

use crate::auth::CookiePolicy;
use crate::db::Database;
use crate::rate_limit::RateLimitConfig;
use crate::registration::Registrar;
use crate::session::SessionManager;

pub use error::ApiError;
pub use users::UsersState;

/// Create the API router, mounted by the caller under `/api/v1`.
pub fn create_api_router(
    db: Database,
    sessions: SessionManager,
    cookies: CookiePolicy,
    registrar: Registrar,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let admin_state = admin::AdminState {
        db: db.clone(),
        sessions: sessions.clone(),
        cookies,
    };

    let users_state = users::UsersState {
        db,
        sessions,
        cookies,
        registrar,
        rate_limit_config,
    };

    Router::new()
        .merge(users::router(users_state))
        .merge(admin::router(admin_state))
}

/// Liveness check.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "success": true, "message": "API is working" }))
}

/// JSON 404 for unknown routes.
pub async fn not_found(uri: axum::http::Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": format!("Route {} not found", uri.path()),
            "code": "not_found",
        })),
    )
}
