//! Authentication state traits and macro.

use super::cookie::CookiePolicy;
use crate::session::SessionManager;

/// Trait for state types that provide session access for authentication.
pub trait HasAuthBackend {
    fn sessions(&self) -> &SessionManager;
    fn cookies(&self) -> CookiePolicy;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `sessions: SessionManager`
/// - `cookies: CookiePolicy`
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub sessions: SessionManager,
///     pub cookies: CookiePolicy,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn sessions(&self) -> &$crate::session::SessionManager {
                &self.sessions
            }
            fn cookies(&self) -> $crate::auth::CookiePolicy {
                self.cookies
            }
        }
    };
}
