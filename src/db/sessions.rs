use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::session::{SessionBackend, StoreError};

/// Session backend on the application database, so sessions survive restarts.
#[derive(Clone)]
pub struct SqliteSessionBackend {
    pool: SqlitePool,
}

impl SqliteSessionBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete records not written for `max_age_secs`. Returns the number removed.
    pub async fn prune_stale(&self, max_age_secs: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE updated_at < datetime('now', ?)")
            .bind(format!("-{} seconds", max_age_secs))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionBackend for SqliteSessionBackend {
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (subject_id, record, updated_at) VALUES (?, ?, datetime('now'))
             ON CONFLICT(subject_id) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT record FROM sessions WHERE subject_id = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE subject_id = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::session::SessionBackend;

    #[tokio::test]
    async fn test_put_get_delete() {
        let db = Database::open(":memory:").await.unwrap();
        let sessions = db.sessions();

        assert!(sessions.get("uuid-1").await.unwrap().is_none());

        sessions.put("uuid-1", "first".to_string()).await.unwrap();
        sessions.put("uuid-1", "second".to_string()).await.unwrap();
        assert_eq!(
            sessions.get("uuid-1").await.unwrap().as_deref(),
            Some("second")
        );

        assert!(sessions.delete("uuid-1").await.unwrap());
        assert!(!sessions.delete("uuid-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_stale_keeps_recent_records() {
        let db = Database::open(":memory:").await.unwrap();
        let sessions = db.sessions();

        sessions.put("fresh", "{}".to_string()).await.unwrap();
        sessions.put("stale", "{}".to_string()).await.unwrap();
        sqlx::query(
            "UPDATE sessions SET updated_at = datetime('now', '-4 days') WHERE subject_id = 'stale'",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let removed = sessions.prune_stale(3 * 24 * 60 * 60).await.unwrap();
        assert_eq!(removed, 1);
        assert!(sessions.get("fresh").await.unwrap().is_some());
        assert!(sessions.get("stale").await.unwrap().is_none());
    }
}
