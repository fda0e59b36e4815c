use serde::{Deserialize, Serialize};

use crate::db::{Avatar, Identity, Role};

/// Public view of an identity: everything except the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_verified: bool,
    pub avatar: Option<Avatar>,
    pub courses: Vec<String>,
}

impl From<&Identity> for SessionSnapshot {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            role: identity.role,
            is_verified: identity.is_verified,
            avatar: identity.avatar.clone(),
            courses: identity.courses.clone(),
        }
    }
}

/// Cached session entry, keyed by subject id. Has no expiry of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user: SessionSnapshot,
    /// JTI of the most recently issued refresh token.
    pub refresh_jti: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_never_carries_password_hash() {
        let identity = Identity {
            id: "uuid-1".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: Some("$argon2id$secret".to_string()),
            role: Role::Admin,
            is_verified: true,
            avatar: None,
            courses: vec!["course-1".to_string()],
        };

        let snapshot = SessionSnapshot::from(&identity);
        assert_eq!(snapshot.role, Role::Admin);
        assert_eq!(snapshot.courses, identity.courses);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }
}
