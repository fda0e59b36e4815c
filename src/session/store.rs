//! Session store: subject id → serialized session record.
//!
//! The backend only moves strings. Serialization and the fail-soft read
//! policy live in [`SessionStore`], so every backend treats a corrupt entry
//! the same way: as no session at all.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::warn;

use super::record::SessionRecord;

/// Raw key-value operations a session cache must provide.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session backend unavailable: {0}")]
    Unavailable(String),
    #[error("failed to serialize session record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// In-process backend. Losing it logs everyone out, nothing more.
#[derive(Default)]
pub struct MemorySessionBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("session map lock poisoned".to_string())
}

#[async_trait]
impl SessionBackend for MemorySessionBackend {
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().map_err(poisoned)?.remove(key).is_some())
    }
}

/// Typed view over a [`SessionBackend`].
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionBackend::new()))
    }

    pub async fn put(&self, subject_id: &str, record: &SessionRecord) -> Result<(), StoreError> {
        let value = serde_json::to_string(record)?;
        self.backend.put(subject_id, value).await
    }

    /// Look up a session. Unreadable entries are reported as absent.
    pub async fn get(&self, subject_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let Some(raw) = self.backend.get(subject_id).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(subject_id = %subject_id, error = %e, "Ignoring unreadable session record");
                Ok(None)
            }
        }
    }

    pub async fn delete(&self, subject_id: &str) -> Result<bool, StoreError> {
        self.backend.delete(subject_id).await
    }
}
