#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode, header},
};
use lectern::{
    ServerConfig,
    auth::{CookiePolicy, SameSitePolicy},
    cli::SessionStoreKind,
    create_app,
    db::{Database, Identity, Role},
    jwt::TokenSecrets,
    mail::{MailError, Mailer},
    password::hash_password,
    rate_limit::RateLimitSettings,
    session::RotationPolicy,
};
use serde_json::Value;
use tower::ServiceExt;

pub fn secrets() -> TokenSecrets {
    TokenSecrets {
        activation: b"activation-secret-for-testing-0000".to_vec(),
        access: b"access-secret-for-testing-00000000".to_vec(),
        refresh: b"refresh-secret-for-testing-0000000".to_vec(),
    }
}

/// Captures outgoing mail so tests can read activation codes.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String, Value)>>,
}

impl RecordingMailer {
    pub fn last_code(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let (_, _, data) = sent.last().expect("no mail sent");
        data["activationCode"].as_str().unwrap().to_string()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, destination: &str, template: &str, data: Value) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), template.to_string(), data));
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _: &str, _: &str, _: Value) -> Result<(), MailError> {
        Err(MailError("smtp unreachable".to_string()))
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub mailer: Arc<RecordingMailer>,
}

pub struct TestOptions {
    pub session_store: SessionStoreKind,
    pub rotation: RotationPolicy,
    pub cookies: CookiePolicy,
    pub rate_limits: RateLimitSettings,
    pub mailer: Option<Arc<dyn Mailer>>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            session_store: SessionStoreKind::Memory,
            rotation: RotationPolicy::AllowConcurrent,
            cookies: CookiePolicy {
                same_site: SameSitePolicy::Lax,
                secure: false,
            },
            rate_limits: RateLimitSettings::permissive(),
            mailer: None,
        }
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(TestOptions::default()).await
}

pub async fn test_app_with(options: TestOptions) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mailer = Arc::new(RecordingMailer::default());
    let config = ServerConfig {
        db: db.clone(),
        secrets: secrets(),
        cookies: options.cookies,
        session_store: options.session_store,
        rotation: options.rotation,
        trust_proxy: false,
        rate_limits: options.rate_limits,
        mailer: options
            .mailer
            .unwrap_or_else(|| mailer.clone() as Arc<dyn Mailer>),
    };
    TestApp {
        app: create_app(&config),
        db,
        mailer,
    }
}

/// Insert a verified identity with a password.
pub async fn seed_identity(db: &Database, name: &str, email: &str, password: &str, role: Role) -> Identity {
    let mut identity = Identity::new(name, email, Some(hash_password(password).unwrap()));
    identity.is_verified = true;
    identity.role = role;
    assert!(db.identities().insert(&identity).await.unwrap());
    identity
}

/// Build a request from the loopback peer, with optional cookie header and JSON body.
pub fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let mut request = builder.body(body).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 50000))));
    request
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    /// Value of a cookie set by this response, if any.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.set_cookies().iter().find_map(|c| {
            let (pair, _) = c.split_once(';').unwrap_or((c.as_str(), ""));
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

pub struct Session {
    pub access: String,
    pub refresh: String,
}

impl Session {
    pub fn access_cookie(&self) -> String {
        format!("access_token={}", self.access)
    }

    pub fn refresh_cookie(&self) -> String {
        format!("refresh_token={}", self.refresh)
    }

    pub fn both(&self) -> String {
        format!("access_token={}; refresh_token={}", self.access, self.refresh)
    }
}

pub async fn login(app: &Router, email: &str, password: &str) -> Session {
    let response = send(
        app,
        request(
            "POST",
            "/api/v1/login",
            None,
            Some(serde_json::json!({ "email": email, "password": password })),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
    Session {
        access: response.cookie("access_token").unwrap(),
        refresh: response.cookie("refresh_token").unwrap(),
    }
}
