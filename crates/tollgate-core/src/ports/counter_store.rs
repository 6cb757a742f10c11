//! Counter store port.

use async_trait::async_trait;
use std::time::Duration;

/// Counter store trait - abstraction over the shared key-value store that
/// holds per-key request counts with expirations (Redis, in-memory).
///
/// Counts are signed: a decrement on an absent key creates it at -1, matching
/// Redis DECR semantics. Callers that need non-negative counts clamp.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter at `key` by 1.
    /// Returns the post-increment count. Creates the key (without an
    /// expiration) if it does not exist.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// Atomically decrement the counter at `key` by 1.
    /// Returns the post-decrement count. Never touches the key's expiration.
    async fn decrement(&self, key: &str) -> Result<i64, StoreError>;

    /// Set the expiration of an existing key.
    /// Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Read the remaining time-to-live of a key.
    /// Returns `None` when the key is absent or has no expiration.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Counter store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Operation timed out")]
    Timeout,
}
