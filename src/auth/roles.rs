//! Role-based authorization, applied after authentication succeeded.

use crate::db::Role;

/// Compile-time set of roles an endpoint accepts.
pub trait RoleConstraint: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    const ALLOWED: &'static [Role] = &[Role::User, Role::Admin];
}

/// Administrators only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Runtime role set, for the `require_roles` route layer.
#[derive(Debug, Clone)]
pub struct AllowedRoles(pub Vec<Role>);

impl AllowedRoles {
    pub fn of<R: RoleConstraint>() -> Self {
        Self(R::ALLOWED.to_vec())
    }
}

/// Whether `role` is in `allowed`.
pub fn authorize_roles(role: Role, allowed: &[Role]) -> bool {
    allowed.contains(&role)
}
