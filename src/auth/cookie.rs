//! Cookie parsing and Set-Cookie construction for session tokens.

use axum::http::{HeaderValue, header};

use crate::jwt::{ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS};
use crate::session::TokenPair;

/// Cookie name for the access token (short-lived, 5 minutes).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh token (long-lived, 3 days).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SameSitePolicy {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSitePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSitePolicy::Strict => "Strict",
            SameSitePolicy::Lax => "Lax",
            SameSitePolicy::None => "None",
        }
    }
}

/// Delivery attributes for the session cookies.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookiePolicy {
    pub same_site: SameSitePolicy,
    /// Add the `Secure` attribute. Browsers require it for `SameSite=None`.
    pub secure: bool,
}

impl CookiePolicy {
    fn build(&self, name: &str, value: &str, max_age: u64) -> String {
        // SameSite=None without Secure is dropped by browsers.
        let secure = self.secure || self.same_site == SameSitePolicy::None;
        format!(
            "{}={}; HttpOnly; SameSite={}; Path=/; Max-Age={}{}",
            name,
            value,
            self.same_site.as_str(),
            max_age,
            if secure { "; Secure" } else { "" }
        )
    }

    pub fn access_cookie(&self, token: &str) -> String {
        self.build(ACCESS_COOKIE_NAME, token, ACCESS_TOKEN_DURATION_SECS)
    }

    pub fn refresh_cookie(&self, token: &str) -> String {
        self.build(REFRESH_COOKIE_NAME, token, REFRESH_TOKEN_DURATION_SECS)
    }

    /// Set-Cookie values delivering a fresh token pair.
    pub fn session_cookies(&self, tokens: &TokenPair) -> [String; 2] {
        [
            self.access_cookie(&tokens.access.token),
            self.refresh_cookie(&tokens.refresh.token),
        ]
    }

    /// Set-Cookie values removing both session cookies.
    pub fn clear_cookies(&self) -> [String; 2] {
        [
            self.build(ACCESS_COOKIE_NAME, "", 0),
            self.build(REFRESH_COOKIE_NAME, "", 0),
        ]
    }
}

/// Append Set-Cookie headers to a response header map.
pub fn append_set_cookies<I>(headers: &mut axum::http::HeaderMap, cookies: I)
where
    I: IntoIterator<Item = String>,
{
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}
