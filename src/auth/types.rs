//! Authentication user types.

use crate::session::SessionSnapshot;

/// Principal resolved from a valid access token and a live session.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Cached snapshot from the session store
    pub user: SessionSnapshot,
}
