pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod mail;
pub mod password;
pub mod rate_limit;
pub mod registration;
pub mod session;

use api::create_api_router;
use auth::CookiePolicy;
use axum::{Router, routing::get};
use cli::SessionStoreKind;
use db::Database;
use jwt::{TokenCodec, TokenSecrets};
use mail::Mailer;
use rate_limit::{RateLimitConfig, RateLimitSettings};
use registration::Registrar;
use session::{RotationPolicy, SessionManager, SessionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// One signing secret per token purpose
    pub secrets: TokenSecrets,
    /// SameSite/Secure attributes of the session cookies
    pub cookies: CookiePolicy,
    /// Session record backend
    pub session_store: SessionStoreKind,
    /// Refresh token rotation behavior
    pub rotation: RotationPolicy,
    /// Take the client IP from X-Forwarded-For (requires running behind a proxy)
    pub trust_proxy: bool,
    /// Per-IP quotas for login and registration
    pub rate_limits: RateLimitSettings,
    /// Outbound mail for activation codes
    pub mailer: Arc<dyn Mailer>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let codec = Arc::new(TokenCodec::new(&config.secrets));

    let store = match config.session_store {
        SessionStoreKind::Memory => SessionStore::in_memory(),
        SessionStoreKind::Sqlite => SessionStore::new(Arc::new(config.db.sessions())),
    };
    let sessions = SessionManager::new(codec.clone(), store, config.rotation);
    let registrar = Registrar::new(codec, config.db.identities(), config.mailer.clone());
    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.rate_limits,
        config.trust_proxy,
    ));

    let api_router = create_api_router(
        config.db.clone(),
        sessions,
        config.cookies,
        registrar,
        rate_limit_config,
    );

    Router::new()
        .route("/test", get(api::health))
        .nest("/api/v1", api_router)
        .fallback(api::not_found)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Serve the application on the given listener until the server exits.
/// Call `init_cleanup` before this to prune stale sessions on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
