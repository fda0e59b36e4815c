use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct IdentityStore {
    pool: SqlitePool,
}

/// User role for authorization. Closed set; unknown strings are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Avatar {
    pub public_id: String,
    pub url: String,
}

/// Authoritative identity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string. `None` for social sign-in identities.
    pub password_hash: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub avatar: Option<Avatar>,
    /// Enrolled course ids.
    pub courses: Vec<String>,
}

impl Identity {
    /// A fresh learner identity with a new subject id.
    pub fn new(name: &str, email: &str, password_hash: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            role: Role::User,
            is_verified: false,
            avatar: None,
            courses: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: String,
    name: String,
    email: String,
    password_hash: Option<String>,
    role: String,
    is_verified: i32,
    avatar_public_id: Option<String>,
    avatar_url: Option<String>,
    courses: String,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = sqlx::Error;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let courses: Vec<String> =
            serde_json::from_str(&row.courses).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let avatar = match (row.avatar_public_id, row.avatar_url) {
            (Some(public_id), Some(url)) => Some(Avatar { public_id, url }),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            is_verified: row.is_verified != 0,
            avatar,
            courses,
        })
    }
}

macro_rules! select_identities {
    ($tail:literal) => {
        concat!(
            "SELECT id, name, email, password_hash, role, is_verified, ",
            "avatar_public_id, avatar_url, courses FROM users ",
            $tail
        )
    };
}

impl IdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new identity. Returns false if the email is already taken.
    pub async fn insert(&self, identity: &Identity) -> Result<bool, sqlx::Error> {
        let courses = encode_courses(&identity.courses)?;
        let (avatar_public_id, avatar_url) = avatar_columns(identity);

        let result = sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role, is_verified, avatar_public_id, avatar_url, courses)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(email) DO NOTHING",
        )
        .bind(&identity.id)
        .bind(&identity.name)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.role.as_str())
        .bind(identity.is_verified as i32)
        .bind(avatar_public_id)
        .bind(avatar_url)
        .bind(courses)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist all mutable fields of an existing identity.
    pub async fn save(&self, identity: &Identity) -> Result<bool, sqlx::Error> {
        let courses = encode_courses(&identity.courses)?;
        let (avatar_public_id, avatar_url) = avatar_columns(identity);

        let result = sqlx::query(
            "UPDATE users SET name = ?, email = ?, password_hash = ?, role = ?, is_verified = ?,
                 avatar_public_id = ?, avatar_url = ?, courses = ?, updated_at = datetime('now')
             WHERE id = ?",
        )
        .bind(&identity.name)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.role.as_str())
        .bind(identity.is_verified as i32)
        .bind(avatar_public_id)
        .bind(avatar_url)
        .bind(courses)
        .bind(&identity.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get an identity by email (case-insensitive).
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, sqlx::Error> {
        let row: Option<IdentityRow> = sqlx::query_as(select_identities!("WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Identity::try_from).transpose()
    }

    /// Get an identity by subject id.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, sqlx::Error> {
        let row: Option<IdentityRow> = sqlx::query_as(select_identities!("WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Identity::try_from).transpose()
    }

    /// List all identities, newest first (for admin dashboard).
    pub async fn list(&self) -> Result<Vec<Identity>, sqlx::Error> {
        let rows: Vec<IdentityRow> =
            sqlx::query_as(select_identities!("ORDER BY created_at DESC"))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Identity::try_from).collect()
    }

    /// Set the role for an identity.
    pub async fn set_role(&self, id: &str, role: Role) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET role = ?, updated_at = datetime('now') WHERE id = ?")
                .bind(role.as_str())
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn encode_courses(courses: &[String]) -> Result<String, sqlx::Error> {
    serde_json::to_string(courses).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn avatar_columns(identity: &Identity) -> (Option<&str>, Option<&str>) {
    match &identity.avatar {
        Some(avatar) => (Some(avatar.public_id.as_str()), Some(avatar.url.as_str())),
        None => (None, None),
    }
}
