//! In-memory counter store - used as fallback when Redis is unavailable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use tollgate_core::{CounterStore, StoreError};

use crate::clock::{Clock, SystemClock};

/// Sweep expired entries every this many mutating operations, so a store
/// that only ever touches fresh keys does not accumulate dead ones.
const SWEEP_INTERVAL: usize = 64;

struct CounterEntry {
    count: i64,
    expires_at: Option<Instant>,
}

/// In-memory counter store mirroring Redis counter semantics: increments
/// create keys without an expiration, decrements can go negative, and only
/// an explicit `expire` call arms the window.
///
/// Note: counts are per-process, not shared across instances. Data is lost
/// on restart.
pub struct MemoryCounterStore<C: Clock = SystemClock> {
    entries: RwLock<HashMap<String, CounterEntry>>,
    clock: C,
    ops: AtomicUsize,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryCounterStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            ops: AtomicUsize::new(0),
        }
    }

    fn expired(entry: &CounterEntry, now: Instant) -> bool {
        entry.expires_at.is_some_and(|at| at <= now)
    }

    /// Apply a signed delta, evicting an expired entry first so the write
    /// starts a fresh (expiration-free) counter, as Redis would after the
    /// key lapses.
    async fn apply(&self, key: &str, delta: i64) -> i64 {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        if self.ops.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == 0 {
            entries.retain(|_, entry| !Self::expired(entry, now));
        }

        match entries.get_mut(key) {
            Some(entry) if !Self::expired(entry, now) => {
                entry.count += delta;
                entry.count
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    CounterEntry {
                        count: delta,
                        expires_at: None,
                    },
                );
                delta
            }
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> CounterStore for MemoryCounterStore<C> {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self.apply(key, 1).await)
    }

    async fn decrement(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self.apply(key, -1).await)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !Self::expired(entry, now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !Self::expired(entry, now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (ManualClock, MemoryCounterStore<ManualClock>) {
        let clock = ManualClock::new();
        let store = MemoryCounterStore::with_clock(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn increment_creates_key_without_expiration() {
        let (_, store) = store();
        assert_eq!(store.increment("k").await.unwrap(), 1);
        assert_eq!(store.increment("k").await.unwrap(), 2);
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expire_arms_the_window() {
        let (clock, store) = store();
        store.increment("k").await.unwrap();
        assert!(store.expire("k", Duration::from_secs(60)).await.unwrap());

        let ttl = store.ttl("k").await.unwrap().unwrap();
        assert_eq!(ttl, Duration::from_secs(60));

        clock.advance(Duration::from_secs(20));
        let ttl = store.ttl("k").await.unwrap().unwrap();
        assert_eq!(ttl, Duration::from_secs(40));
    }

    #[tokio::test]
    async fn expiry_ends_the_window() {
        let (clock, store) = store();
        store.increment("k").await.unwrap();
        store.expire("k", Duration::from_secs(60)).await.unwrap();

        clock.advance(Duration::from_secs(61));
        assert_eq!(store.ttl("k").await.unwrap(), None);
        // A fresh window starts at 1, without an expiration.
        assert_eq!(store.increment("k").await.unwrap(), 1);
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expire_on_absent_key_returns_false() {
        let (_, store) = store();
        assert!(!store.expire("k", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn decrement_can_go_negative() {
        let (_, store) = store();
        assert_eq!(store.decrement("k").await.unwrap(), -1);
        assert_eq!(store.decrement("k").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn decrement_does_not_touch_expiration() {
        let (clock, store) = store();
        store.increment("k").await.unwrap();
        store.expire("k", Duration::from_secs(60)).await.unwrap();

        store.decrement("k").await.unwrap();
        clock.advance(Duration::from_secs(30));
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_, store) = store();
        store.increment("k").await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.increment("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let (_, store) = store();
        for _ in 0..5 {
            store.increment("a").await.unwrap();
        }
        assert_eq!(store.increment("b").await.unwrap(), 1);
    }
}
