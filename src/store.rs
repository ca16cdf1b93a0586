//! Metadata store collaborator
//!
//! The durable key/value-set store holding tenant registries, the shared
//! delivery set, and the token-to-fingerprint mapping. The core only relies
//! on set membership and plain key lookup, so the contract is deliberately
//! small; the production implementation is Redis.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;

/// Abstraction over the durable key/value-set store
///
/// Implementations must be cheap to share across requests; the service holds
/// one handle for its whole lifetime.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Add a value to the set stored under `key`
    async fn add_to_set(&self, key: &str, value: &str) -> Result<()>;

    /// All members of the set stored under `key`, unordered
    async fn members_of(&self, key: &str) -> Result<Vec<String>>;

    /// Number of members in the set stored under `key`
    async fn cardinality(&self, key: &str) -> Result<usize>;

    /// Whether any value is stored under `key`
    async fn exists(&self, key: &str) -> Result<bool>;

    /// The string value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove an exact value from the set stored under `key`; no-op when absent
    async fn remove_from_set(&self, key: &str, value: &str) -> Result<()>;
}

/// Redis-backed metadata store
///
/// Wraps a [`ConnectionManager`], which multiplexes and reconnects under the
/// hood, so cloning per call is cheap.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the store at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl MetadataStore for RedisStore {
    async fn add_to_set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn members_of(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn cardinality(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        Ok(conn.scard(key).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn remove_from_set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, value).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store used by registry and lifecycle tests

    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;

    use super::*;

    /// In-process [`MetadataStore`] with the same set/string semantics as Redis
    #[derive(Default)]
    pub struct MemoryStore {
        sets: Mutex<HashMap<String, BTreeSet<String>>>,
        strings: Mutex<HashMap<String, String>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a token -> fingerprint mapping, as token issuance would
        pub fn put_string(&self, key: &str, value: &str) {
            self.strings
                .lock()
                .expect("strings lock")
                .insert(key.to_string(), value.to_string());
        }
    }

    #[async_trait]
    impl MetadataStore for MemoryStore {
        async fn add_to_set(&self, key: &str, value: &str) -> Result<()> {
            self.sets
                .lock()
                .expect("sets lock")
                .entry(key.to_string())
                .or_default()
                .insert(value.to_string());
            Ok(())
        }

        async fn members_of(&self, key: &str) -> Result<Vec<String>> {
            Ok(self
                .sets
                .lock()
                .expect("sets lock")
                .get(key)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default())
        }

        async fn cardinality(&self, key: &str) -> Result<usize> {
            Ok(self
                .sets
                .lock()
                .expect("sets lock")
                .get(key)
                .map(BTreeSet::len)
                .unwrap_or(0))
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.strings.lock().expect("strings lock").contains_key(key)
                || self.sets.lock().expect("sets lock").contains_key(key))
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.strings.lock().expect("strings lock").get(key).cloned())
        }

        async fn remove_from_set(&self, key: &str, value: &str) -> Result<()> {
            if let Some(set) = self.sets.lock().expect("sets lock").get_mut(key) {
                set.remove(value);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_memory_store_set_semantics() {
        let store = MemoryStore::new();
        store.add_to_set("k", "a").await.unwrap();
        store.add_to_set("k", "a").await.unwrap();
        store.add_to_set("k", "b").await.unwrap();
        assert_eq!(store.cardinality("k").await.unwrap(), 2);

        store.remove_from_set("k", "a").await.unwrap();
        assert_eq!(store.members_of("k").await.unwrap(), vec!["b".to_string()]);

        // Removing an absent member is a no-op.
        store.remove_from_set("k", "missing").await.unwrap();
        assert_eq!(store.cardinality("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_string_semantics() {
        let store = MemoryStore::new();
        assert!(!store.exists("token").await.unwrap());
        assert_eq!(store.get("token").await.unwrap(), None);

        store.put_string("token", "fingerprint");
        assert!(store.exists("token").await.unwrap());
        assert_eq!(
            store.get("token").await.unwrap(),
            Some("fingerprint".to_string())
        );
    }
}
