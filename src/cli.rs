//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;

use crate::ServerConfig;
use crate::auth::{CookiePolicy, SameSitePolicy};
use crate::db::{Database, Role};
use crate::jwt::TokenSecrets;
use crate::mail::LogMailer;
use crate::rate_limit::RateLimitSettings;
use crate::session::RotationPolicy;
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

const ACCESS_SECRET_VAR: &str = "ACCESS_TOKEN_SECRET";
const REFRESH_SECRET_VAR: &str = "REFRESH_TOKEN_SECRET";
const ACTIVATION_SECRET_VAR: &str = "ACTIVATION_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Where session records live.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStoreKind {
    /// In-process map; restarting the server logs everyone out
    #[default]
    Memory,
    /// `sessions` table in the application database
    Sqlite,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Lectern",
    about = "E-learning backend with cookie-based session authentication"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "LECTERN_PORT", default_value = "8000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "LECTERN_DATABASE", default_value = "lectern.db")]
    pub database: String,

    /// Session store backend
    #[arg(long, value_enum, env = "LECTERN_SESSION_STORE", default_value = "memory")]
    pub session_store: SessionStoreKind,

    /// Whether older refresh tokens stay valid after a refresh
    #[arg(long, value_enum, env = "LECTERN_ROTATION", default_value = "allow-concurrent")]
    pub rotation: RotationPolicy,

    /// Public origin of the frontend (e.g. "https://learn.example.com").
    /// An https origin turns on Secure cookies
    #[arg(long, env = "LECTERN_PUBLIC_ORIGIN", default_value = "http://localhost:8000")]
    pub public_origin: String,

    /// SameSite attribute of the session cookies
    #[arg(long, value_enum, env = "LECTERN_SAME_SITE", default_value = "lax")]
    pub same_site: SameSitePolicy,

    /// Rate limit on the client IP from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long, env = "LECTERN_TRUST_PROXY")]
    pub trust_proxy: bool,

    /// Path to a file with ACCESS_TOKEN_SECRET=, REFRESH_TOKEN_SECRET= and
    /// ACTIVATION_SECRET= lines. Prefer the environment variables instead
    #[arg(long)]
    pub secrets_file: Option<String>,

    /// Give the identity with this email the admin role on startup
    #[arg(long)]
    pub promote_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Parse `KEY=value` lines into token secrets. Blank lines and `#` comments are skipped.
pub fn parse_secrets_file(content: &str) -> Result<TokenSecrets, String> {
    let mut access = None;
    let mut refresh = None;
    let mut activation = None;

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(format!("line {}: expected KEY=value", index + 1));
        };
        let value = Some(value.trim().as_bytes().to_vec());
        match key.trim() {
            ACCESS_SECRET_VAR => access = value,
            REFRESH_SECRET_VAR => refresh = value,
            ACTIVATION_SECRET_VAR => activation = value,
            other => return Err(format!("line {}: unknown key {}", index + 1, other)),
        }
    }

    Ok(TokenSecrets {
        access: access.ok_or_else(|| format!("{} is missing", ACCESS_SECRET_VAR))?,
        refresh: refresh.ok_or_else(|| format!("{} is missing", REFRESH_SECRET_VAR))?,
        activation: activation.ok_or_else(|| format!("{} is missing", ACTIVATION_SECRET_VAR))?,
    })
}

fn take_env_secret(name: &str) -> Option<Vec<u8>> {
    let value = std::env::var(name).ok()?;
    // Clear the environment variable to prevent leaking
    // SAFETY: We're single-threaded at this point during startup,
    // and no other code is reading this environment variable.
    unsafe { std::env::remove_var(name) };
    Some(value.into_bytes())
}

/// Load the three token secrets from environment variables or a file.
/// Returns None and logs an error if they cannot be loaded or are too weak.
pub fn load_secrets(secrets_file: Option<&str>) -> Option<TokenSecrets> {
    let from_env = (
        take_env_secret(ACCESS_SECRET_VAR),
        take_env_secret(REFRESH_SECRET_VAR),
        take_env_secret(ACTIVATION_SECRET_VAR),
    );

    let secrets = match (from_env, secrets_file) {
        ((Some(access), Some(refresh), Some(activation)), _) => TokenSecrets {
            access,
            refresh,
            activation,
        },
        (_, Some(path)) => {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    error!(path = %path, error = %e, "Failed to read secrets file");
                    return None;
                }
            };
            match parse_secrets_file(&content) {
                Ok(secrets) => secrets,
                Err(e) => {
                    error!(path = %path, error = %e, "Invalid secrets file");
                    return None;
                }
            }
        }
        _ => {
            error!(
                "Token secrets are required. Set {}, {} and {} (recommended) or use --secrets-file",
                ACCESS_SECRET_VAR, REFRESH_SECRET_VAR, ACTIVATION_SECRET_VAR
            );
            return None;
        }
    };

    if let Err(e) = secrets.validate() {
        error!(error = %e, "Rejected token secrets");
        return None;
    }

    Some(secrets)
}

/// Parse and validate the public origin URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_origin(origin: &str) -> Option<Url> {
    let url = match Url::parse(origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %origin, error = %e, "Invalid public-origin URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        error!("public-origin must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Handle the --promote-admin flag.
pub async fn handle_promote_admin(db: &Database, email: &str) -> bool {
    let identity = match db.identities().find_by_email(email).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            error!(email = %email, "No identity with this email");
            return false;
        }
        Err(e) => {
            error!(error = %e, "Failed to look up identity");
            return false;
        }
    };

    if identity.role == Role::Admin {
        warn!(email = %email, "Identity is already an admin");
        return true;
    }

    match db.identities().set_role(&identity.id, Role::Admin).await {
        Ok(_) => {
            info!(email = %email, "Promoted to admin");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to promote admin");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    public_origin: &Url,
    secrets: TokenSecrets,
) -> ServerConfig {
    let cookies = CookiePolicy {
        same_site: args.same_site,
        secure: public_origin.scheme() == "https",
    };

    ServerConfig {
        db,
        secrets,
        cookies,
        session_store: args.session_store,
        rotation: args.rotation,
        trust_proxy: args.trust_proxy,
        rate_limits: RateLimitSettings::default(),
        mailer: Arc::new(LogMailer),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
