//! Durable key-value persistence
//!
//! Every record the assistant keeps (conversations, the memory log, the user
//! profile, the token ledger, the playlist catalog) is stored as a JSON blob
//! under a logical key. Components talk to the typed [`MemoryStore`] facade,
//! never to a concrete backend.

mod sqlite;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

pub use sqlite::SqliteStore;

/// Logical keys for the persisted records
pub mod keys {
    pub const CONVERSATIONS: &str = "nexus.conversations";
    pub const MEMORY: &str = "nexus.memory";
    pub const PROFILE: &str = "nexus.profile";
    pub const TOKEN_USAGE: &str = "nexus.token_usage";
    pub const PLAYLISTS: &str = "nexus.playlists";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Raw string storage keyed by logical name
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Volatile store, used by tests and as a fallback when no data dir is writable
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Typed facade over a [`KeyValueStore`]
///
/// [`MemoryStore::load`] never fails: a missing, unreadable or corrupt record
/// reads as the type's default and the problem is logged. Load-modify-save
/// paths use [`MemoryStore::read`] instead, which keeps backend failures
/// apart from absence so a failed read is never written back as empty.
#[derive(Clone)]
pub struct MemoryStore {
    backend: Arc<dyn KeyValueStore>,
}

impl MemoryStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Store backed by a fresh [`InMemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub async fn load<T>(&self, key: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        self.try_load(key).await.unwrap_or_default()
    }

    /// Like [`MemoryStore::load`] but tells "absent" apart from "present"
    pub async fn try_load<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match self.read(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "storage read failed, treating as empty");
                None
            }
        }
    }

    /// Record under `key`, `Ok(None)` when absent.
    ///
    /// Only backend failures are errors. A corrupt blob is logged and reads
    /// as absent, so the next write replaces it.
    pub async fn read<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let Some(raw) = self.backend.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "corrupt record, treating as empty");
                Ok(None)
            }
        }
    }

    pub async fn save<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, raw).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.backend.remove(key).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        hits: u32,
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryStore::in_memory();
        store.save("counter", &Counter { hits: 3 }).await.unwrap();

        let loaded: Counter = store.load("counter").await;
        assert_eq!(loaded, Counter { hits: 3 });
    }

    #[tokio::test]
    async fn test_missing_key_is_default() {
        let store = MemoryStore::in_memory();
        let loaded: Counter = store.load("nothing-here").await;
        assert_eq!(loaded, Counter::default());
        assert!(store.try_load::<Counter>("nothing-here").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_default() {
        let backend = Arc::new(InMemoryStore::new());
        backend
            .set("counter", "{not json".to_string())
            .await
            .unwrap();

        let store = MemoryStore::new(backend);
        let loaded: Counter = store.load("counter").await;
        assert_eq!(loaded, Counter::default());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::in_memory();
        store.save("counter", &Counter { hits: 1 }).await.unwrap();
        store.remove("counter").await.unwrap();
        assert!(store.try_load::<Counter>("counter").await.is_none());
    }

    #[tokio::test]
    async fn test_read_separates_failure_from_absence() {
        let backend = Arc::new(testing::FlakyStore::new());
        let store = MemoryStore::new(backend.clone());

        assert!(store.read::<Counter>("counter").await.unwrap().is_none());

        store.save("counter", &Counter { hits: 2 }).await.unwrap();
        backend.fail_reads(1);
        assert!(store.read::<Counter>("counter").await.is_err());
        assert_eq!(
            store.read::<Counter>("counter").await.unwrap(),
            Some(Counter { hits: 2 })
        );
    }

    #[tokio::test]
    async fn test_failed_load_reads_as_default() {
        let backend = Arc::new(testing::FlakyStore::new());
        let store = MemoryStore::new(backend.clone());
        store.save("counter", &Counter { hits: 5 }).await.unwrap();

        backend.fail_reads(1);
        let loaded: Counter = store.load("counter").await;
        assert_eq!(loaded, Counter::default());
        let loaded: Counter = store.load("counter").await;
        assert_eq!(loaded, Counter { hits: 5 });
    }
}
