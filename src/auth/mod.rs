//! Cookie-based session authentication with role-based access control.
//!
//! Short-lived access tokens (5 min) are verified on every request and then
//! checked against the session store, so logout takes effect immediately.
//! Expired access tokens are not refreshed here: clients call the refresh
//! endpoint with their long-lived refresh token (3 days).

mod cookie;
mod errors;
mod extractors;
mod ip;
mod middleware;
mod roles;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, CookiePolicy, REFRESH_COOKIE_NAME, SameSitePolicy, append_set_cookies,
    get_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::Auth;
pub use ip::{FORWARDED_FOR_HEADER, HasHeadersAndExtensions, extract_client_ip};
pub use middleware::{is_authenticated, require_roles};
pub use roles::{AdminOnly, AllowedRoles, AnyRole, RoleConstraint, authorize_roles};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
