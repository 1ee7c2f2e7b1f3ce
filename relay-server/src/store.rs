//! Session store adapter.
//!
//! A thin async capability over a key-value backend: get, set, delete and
//! list-keys on byte-string values. No retries and no transactions; backend
//! failures surface as [`StoreError`].

use async_trait::async_trait;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use relay_common::config::StoreConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Store operation errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store command failed: {0}")]
    Command(String),

    #[error("Stored value for '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
            Self::Connection(e.to_string())
        } else {
            Self::Command(e.to_string())
        }
    }
}

/// Key-value capability backing session history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name (e.g., "redis", "memory")
    fn name(&self) -> &str;

    /// Get the raw value for a key, `None` when absent.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Set a key, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete a key. Deleting an absent key is not an error.
    ///
    /// Takes raw bytes so that anything returned by [`list_keys`](Self::list_keys)
    /// can be deleted, including keys other clients wrote that are not UTF-8.
    async fn delete(&self, key: &[u8]) -> StoreResult<()>;

    /// Enumerate every key in the store, as stored.
    async fn list_keys(&self) -> StoreResult<Vec<Vec<u8>>>;

    /// Returns true if the backend is reachable.
    async fn is_healthy(&self) -> bool;
}

// ============================================================================
// Redis
// ============================================================================

/// Redis-backed session store.
///
/// Uses a `ConnectionManager`, which reconnects on its own after drops.
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

/// Connection parameters for a Redis store.
///
/// Built field by field rather than as a `redis://` URL, so passwords with
/// URL-reserved characters are passed through untouched.
pub fn connection_info(config: &StoreConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            db: config.database,
            password: config.password().map(str::to_string),
            ..Default::default()
        },
    }
}

impl RedisStore {
    /// Connect to Redis.
    pub async fn connect(info: ConnectionInfo) -> StoreResult<Self> {
        let client =
            redis::Client::open(info).map_err(|e| StoreError::Connection(e.to_string()))?;

        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_keys(&self) -> StoreResult<Vec<Vec<u8>>> {
        // KEYS walks the whole keyspace; acceptable for the hourly purge only.
        let mut conn = self.conn.clone();
        let keys = redis::cmd("KEYS")
            .arg("*")
            .query_async::<Vec<Vec<u8>>>(&mut conn)
            .await?;
        Ok(keys)
    }

    async fn is_healthy(&self) -> bool {
        let mut conn = self.conn.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(response) => response == "PONG",
            Err(_) => false,
        }
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store. Used by tests and for running without Redis.
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StoreResult<()> {
        // Only UTF-8 keys can be stored here, so anything else is already absent.
        if let Ok(key) = std::str::from_utf8(key) {
            self.entries.write().await.remove(key);
        }
        Ok(())
    }

    async fn list_keys(&self) -> StoreResult<Vec<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .map(|key| key.as_bytes().to_vec())
            .collect())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Create the store selected by `store.backend`.
pub async fn create_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
    match config.backend.as_str() {
        "memory" => {
            tracing::warn!("Using in-memory session store; history is lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
        "redis" => {
            let store = RedisStore::connect(connection_info(config)).await?;
            tracing::info!(host = %config.host, port = config.port, db = config.database, "Connected to Redis");
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("Unknown store backend: {}", other),
    }
}
