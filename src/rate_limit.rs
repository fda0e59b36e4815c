//! Rate limiting for credential endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and registration mail spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Quotas for the limited endpoints.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    /// Sustained login attempts per second per IP
    pub login_per_sec: u32,
    /// Login attempts allowed in a burst
    pub login_burst: u32,
    /// Registration attempts per minute per IP
    pub registration_per_min: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_per_sec: 1,
            login_burst: 5,
            registration_per_min: 3,
        }
    }
}

impl RateLimitSettings {
    /// Limits high enough to never trigger in test suites.
    pub fn permissive() -> Self {
        Self {
            login_per_sec: 1000,
            login_burst: 1000,
            registration_per_min: 1000,
        }
    }
}

fn nonzero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

/// Rate limiters plus the IP resolution they key on.
pub struct RateLimitConfig {
    /// Login and social sign-in (default: 5 burst, then 1 per second)
    pub login: IpLimiter,
    /// Registration (default: 3 per minute)
    pub registration: IpLimiter,
    /// Key on `X-Forwarded-For` instead of the peer address
    pub trust_proxy: bool,
}

impl RateLimitConfig {
    pub fn new(settings: RateLimitSettings, trust_proxy: bool) -> Self {
        Self {
            login: RateLimiter::keyed(
                Quota::per_second(nonzero(settings.login_per_sec))
                    .allow_burst(nonzero(settings.login_burst)),
            ),
            registration: RateLimiter::keyed(Quota::per_minute(nonzero(
                settings.registration_per_min,
            ))),
            trust_proxy,
        }
    }
}

fn limit(limiter: &IpLimiter, ip: String, message: &'static str) -> Result<(), Response> {
    limiter.check_key(&ip).map_err(|_| {
        tracing::debug!(ip = %ip, "Rate limit hit");
        too_many_requests(message)
    })
}

fn too_many_requests(message: &'static str) -> Response {
    (
        axum::http::StatusCode::TOO_MANY_REQUESTS,
        axum::Json(serde_json::json!({ "error": message, "code": "rate_limited" })),
    )
        .into_response()
}

fn unknown_client() -> Response {
    (
        axum::http::StatusCode::FORBIDDEN,
        axum::Json(serde_json::json!({
            "error": "Unable to determine client IP.",
            "code": "forbidden",
        })),
    )
        .into_response()
}

/// Middleware for rate limiting login endpoints.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let Ok(ip) = extract_client_ip(&request, config.trust_proxy) else {
        return unknown_client();
    };

    match limit(
        &config.login,
        ip,
        "Too many login attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_registration(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let Ok(ip) = extract_client_ip(&request, config.trust_proxy) else {
        return unknown_client();
    };

    match limit(
        &config.registration,
        ip,
        "Too many signup attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_burst_then_blocked() {
        let config = RateLimitConfig::new(
            RateLimitSettings {
                login_per_sec: 1,
                login_burst: 2,
                registration_per_min: 1,
            },
            false,
        );

        assert!(config.login.check_key(&"10.0.0.1".to_string()).is_ok());
        assert!(config.login.check_key(&"10.0.0.1".to_string()).is_ok());
        assert!(config.login.check_key(&"10.0.0.1".to_string()).is_err());
        // Other clients are unaffected.
        assert!(config.login.check_key(&"10.0.0.2".to_string()).is_ok());
    }

    #[test]
    fn test_zero_quota_clamped() {
        let config = RateLimitConfig::new(
            RateLimitSettings {
                login_per_sec: 0,
                login_burst: 0,
                registration_per_min: 0,
            },
            false,
        );

        assert!(config.registration.check_key(&"10.0.0.1".to_string()).is_ok());
    }
}
