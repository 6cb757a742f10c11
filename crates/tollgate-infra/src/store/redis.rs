//! Redis counter store.
//!
//! INCR/DECR/EXPIRE/TTL/DEL mapped onto the counter store port, each call
//! bounded by a per-operation timeout so a slow Redis degrades into the
//! limiter's fail-open path instead of stalling requests.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use tollgate_core::{CounterStore, StoreError};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Per-operation timeout
    pub op_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            op_timeout: Duration::from_millis(500),
        }
    }
}

impl RedisStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            op_timeout: Duration::from_millis(
                std::env::var("STORE_OP_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
        }
    }
}

/// Redis-backed counter store.
///
/// Uses the connection manager for automatic reconnection; every operation
/// clones the manager handle, which multiplexes over one connection.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCounterStore {
    pub async fn new(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;

        // Bound connection establishment so an unreachable Redis cannot hang
        // startup.
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to Redis counter store");

        Ok(Self {
            conn,
            op_timeout: config.op_timeout,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisStoreConfig::from_env()).await
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(|e| StoreError::Operation(e.to_string()))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.incr(key, 1).await }).await
    }

    async fn decrement(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.decr(key, 1).await }).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1) as i64;
        self.bounded(async move { conn.expire(key, secs).await })
            .await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let ttl: i64 = self.bounded(async move { conn.ttl(key).await }).await?;
        // -2 means the key is absent, -1 means no expiration is set.
        if ttl >= 0 {
            Ok(Some(Duration::from_secs(ttl as u64)))
        } else {
            Ok(None)
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.del::<_, ()>(key).await })
            .await
    }
}
