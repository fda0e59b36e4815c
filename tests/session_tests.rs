mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{TestOptions, login, request, secrets, seed_identity, send, test_app, test_app_with};
use lectern::{
    ServerConfig,
    auth::{CookiePolicy, SameSitePolicy},
    cli::SessionStoreKind,
    create_app,
    db::Role,
    jwt::{ACCESS_TOKEN_DURATION_SECS, TokenCodec, unix_now},
    mail::LogMailer,
    rate_limit::RateLimitSettings,
    session::RotationPolicy,
};
use serde_json::json;

#[tokio::test]
async fn test_login_sets_cookies_and_returns_snapshot() {
    let t = test_app().await;
    seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;

    let response = send(
        &t.app,
        request(
            "POST",
            "/api/v1/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "hunter22" })),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["email"], "alice@example.com");
    assert_eq!(response.body["user"]["role"], "user");
    assert!(response.body["user"].get("password_hash").is_none());
    assert!(!response.body.to_string().contains("argon2"));

    let cookies = response.set_cookies();
    let access = cookies.iter().find(|c| c.starts_with("access_token=")).unwrap();
    let refresh = cookies.iter().find(|c| c.starts_with("refresh_token=")).unwrap();
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("SameSite=Lax"));
    assert!(access.contains("Max-Age=300"));
    assert!(!access.contains("Secure"));
    assert!(refresh.contains("Max-Age=259200"));

    assert_eq!(
        response.body["accessToken"].as_str(),
        response.cookie("access_token").as_deref()
    );
}

#[tokio::test]
async fn test_secure_cookie_policy() {
    let t = test_app_with(TestOptions {
        cookies: CookiePolicy {
            same_site: SameSitePolicy::Strict,
            secure: true,
        },
        ..Default::default()
    })
    .await;
    seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;

    let response = send(
        &t.app,
        request(
            "POST",
            "/api/v1/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "hunter22" })),
        ),
    )
    .await;

    for cookie in response.set_cookies() {
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.ends_with("; Secure"));
    }
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let t = test_app().await;
    seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;

    let wrong_password = send(
        &t.app,
        request(
            "POST",
            "/api/v1/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "hunter23" })),
        ),
    )
    .await;
    let unknown_email = send(
        &t.app,
        request(
            "POST",
            "/api/v1/login",
            None,
            Some(json!({ "email": "nobody@example.com", "password": "hunter22" })),
        ),
    )
    .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.code(), "invalid_credentials");
    assert_eq!(wrong_password.body, unknown_email.body);
    assert!(wrong_password.set_cookies().is_empty());

    let empty = send(
        &t.app,
        request(
            "POST",
            "/api/v1/login",
            None,
            Some(json!({ "email": "", "password": "" })),
        ),
    )
    .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_me_requires_access_cookie() {
    let t = test_app().await;
    let identity = seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;

    let response = send(&t.app, request("GET", "/api/v1/me", None, None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "unauthenticated");

    let session = login(&t.app, "alice@example.com", "hunter22").await;
    let response = send(
        &t.app,
        request("GET", "/api/v1/me", Some(&session.access_cookie()), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["id"], identity.id.as_str());
}

#[tokio::test]
async fn test_logout_revokes_unexpired_access_token() {
    let t = test_app().await;
    seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;
    let session = login(&t.app, "alice@example.com", "hunter22").await;

    let response = send(
        &t.app,
        request("POST", "/api/v1/logout", Some(&session.both()), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    let cleared = response.set_cookies();
    assert_eq!(cleared.len(), 2);
    assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));

    // The access token is still within its lifetime but the session is gone.
    let response = send(
        &t.app,
        request("GET", "/api/v1/me", Some(&session.access_cookie()), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "session_revoked");
    assert_eq!(response.set_cookies().len(), 2);

    let response = send(
        &t.app,
        request("GET", "/api/v1/refresh", Some(&session.refresh_cookie()), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "session_revoked");
}

#[tokio::test]
async fn test_logout_requires_authentication() {
    let t = test_app().await;

    let response = send(&t.app, request("POST", "/api/v1/logout", None, None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let t = test_app().await;
    seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;
    let session = login(&t.app, "alice@example.com", "hunter22").await;

    let response = send(
        &t.app,
        request("GET", "/api/v1/refresh", Some(&session.refresh_cookie()), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "success");

    let new_access = response.cookie("access_token").unwrap();
    let new_refresh = response.cookie("refresh_token").unwrap();
    assert_eq!(response.body["accessToken"].as_str(), Some(new_access.as_str()));
    assert_ne!(new_refresh, session.refresh);

    let response = send(
        &t.app,
        request(
            "GET",
            "/api/v1/me",
            Some(&format!("access_token={}", new_access)),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_cookie_or_with_access_token() {
    let t = test_app().await;
    seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;
    let session = login(&t.app, "alice@example.com", "hunter22").await;

    let response = send(&t.app, request("GET", "/api/v1/refresh", None, None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "unauthenticated");

    // An access token in the refresh slot is the wrong purpose.
    let response = send(
        &t.app,
        request(
            "GET",
            "/api/v1/refresh",
            Some(&format!("refresh_token={}", session.access)),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "token_malformed");
}

#[tokio::test]
async fn test_superseded_refresh_token_under_each_policy() {
    for (rotation, expected) in [
        (RotationPolicy::AllowConcurrent, StatusCode::OK),
        (RotationPolicy::RevokeOnRotate, StatusCode::UNAUTHORIZED),
    ] {
        let t = test_app_with(TestOptions {
            rotation,
            ..Default::default()
        })
        .await;
        seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;
        let session = login(&t.app, "alice@example.com", "hunter22").await;

        let first = send(
            &t.app,
            request("GET", "/api/v1/refresh", Some(&session.refresh_cookie()), None),
        )
        .await;
        assert_eq!(first.status, StatusCode::OK);

        let replay = send(
            &t.app,
            request("GET", "/api/v1/refresh", Some(&session.refresh_cookie()), None),
        )
        .await;
        assert_eq!(replay.status, expected, "{:?}", rotation);
    }
}

#[tokio::test]
async fn test_malformed_token_clears_cookies() {
    let t = test_app().await;

    let response = send(
        &t.app,
        request(
            "GET",
            "/api/v1/me",
            Some("access_token=not.a.jwt; refresh_token=whatever"),
            None,
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "token_malformed");
    let cleared = response.set_cookies();
    assert_eq!(cleared.len(), 2);
    assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
}

#[tokio::test]
async fn test_forged_token_is_malformed() {
    let t = test_app().await;
    let identity = seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;
    login(&t.app, "alice@example.com", "hunter22").await;

    let mut other = secrets();
    other.access = b"some-other-access-secret-000000000".to_vec();
    let forged = TokenCodec::new(&other).issue_access(&identity.id).unwrap();

    let response = send(
        &t.app,
        request(
            "GET",
            "/api/v1/me",
            Some(&format!("access_token={}", forged.token)),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "token_malformed");
}

#[tokio::test]
async fn test_expired_access_token_keeps_cookies() {
    let t = test_app().await;
    let identity = seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;
    let session = login(&t.app, "alice@example.com", "hunter22").await;

    let stale = TokenCodec::new(&secrets())
        .issue_access_at(
            &identity.id,
            unix_now().unwrap() - ACCESS_TOKEN_DURATION_SECS - 10,
        )
        .unwrap();

    let response = send(
        &t.app,
        request(
            "GET",
            "/api/v1/me",
            Some(&format!("access_token={}; {}", stale.token, session.refresh_cookie())),
            None,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "token_expired");
    assert!(response.set_cookies().is_empty());

    // The refresh cookie still works.
    let response = send(
        &t.app,
        request("GET", "/api/v1/refresh", Some(&session.refresh_cookie()), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_logins_share_session() {
    let t = test_app().await;
    seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;

    let laptop = login(&t.app, "alice@example.com", "hunter22").await;
    let phone = login(&t.app, "alice@example.com", "hunter22").await;

    for session in [&laptop, &phone] {
        let response = send(
            &t.app,
            request("GET", "/api/v1/me", Some(&session.access_cookie()), None),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK);
    }

    // Logging out on one device ends the session everywhere.
    send(
        &t.app,
        request("POST", "/api/v1/logout", Some(&phone.access_cookie()), None),
    )
    .await;
    let response = send(
        &t.app,
        request("GET", "/api/v1/me", Some(&laptop.access_cookie()), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sqlite_sessions_survive_restart() {
    let t = test_app_with(TestOptions {
        session_store: SessionStoreKind::Sqlite,
        ..Default::default()
    })
    .await;
    seed_identity(&t.db, "Alice", "alice@example.com", "hunter22", Role::User).await;
    let session = login(&t.app, "alice@example.com", "hunter22").await;

    // A second app over the same database stands in for a restarted server.
    let restarted = create_app(&ServerConfig {
        db: t.db.clone(),
        secrets: secrets(),
        cookies: CookiePolicy::default(),
        session_store: SessionStoreKind::Sqlite,
        rotation: RotationPolicy::AllowConcurrent,
        trust_proxy: false,
        rate_limits: RateLimitSettings::permissive(),
        mailer: Arc::new(LogMailer),
    });

    let response = send(
        &restarted,
        request("GET", "/api/v1/me", Some(&session.access_cookie()), None),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn test_login_rate_limited_per_ip() {
    let t = test_app_with(TestOptions {
        rate_limits: RateLimitSettings {
            login_per_sec: 1,
            login_burst: 2,
            registration_per_min: 1,
        },
        ..Default::default()
    })
    .await;

    let attempt = || {
        request(
            "POST",
            "/api/v1/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "guess" })),
        )
    };

    assert_eq!(send(&t.app, attempt()).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(send(&t.app, attempt()).await.status, StatusCode::UNAUTHORIZED);
    let limited = send(&t.app, attempt()).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.code(), "rate_limited");
}
