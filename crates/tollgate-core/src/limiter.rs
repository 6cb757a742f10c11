//! The rate limiter core.
//!
//! One counter store round trip per request on the hot path, plus a TTL read
//! for the reset header. The limiter is an approximate fixed-window counter,
//! not an exact meter: compensating decrements racing concurrent increments
//! on the same key can transiently under- or over-count, and that is a
//! documented property of the design.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use uuid::Uuid;

use crate::decision::Decision;
use crate::policy::RateLimitPolicy;
use crate::key::RequestSignals;
use crate::ports::{CounterStore, StoreError};

/// The core limiter: evaluates policies against the shared counter store.
///
/// Every store fault on the request path fails open - an unreachable store
/// must never become a cause of total service unavailability.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Evaluate one request against a policy, producing a [`Decision`].
    ///
    /// The increment and the conditional expire below are two separate round
    /// trips, not one atomic unit. Two concurrent first requests may both
    /// increment before either expires; exactly one observes count 1 and
    /// sets the TTL, which is correct. If the process that observed count 1
    /// dies before the expire lands, the key persists without an expiration
    /// until cleared manually - accepted (bounded by process supervision)
    /// in exchange for keeping the hot path free of distributed locking.
    pub async fn evaluate(&self, policy: &RateLimitPolicy, signals: &RequestSignals) -> Decision {
        let key = policy.counter_key(signals);

        let count = match self.store.increment(&key).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Counter increment failed, failing open");
                return Decision::fail_open(policy, key);
            }
        };

        if count == 1 {
            // The 0 -> 1 transition is the only point at which the TTL is
            // ever set; later increments and decrements within the window
            // must not touch it, or the window would never close.
            let window = Duration::from_secs(policy.window_secs());
            if let Err(e) = self.store.expire(&key, window).await {
                // The window may never have been armed, so the count cannot
                // be trusted: fail open, uncounted, like any other fault.
                tracing::warn!(key = %key, error = %e, "Failed to set window expiration, failing open");
                return Decision::fail_open(policy, key);
            }
        }

        let ttl = match self.store.ttl(&key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "TTL read failed, failing open");
                return Decision::fail_open(policy, key);
            }
        };
        let ttl = ttl.unwrap_or_else(|| Duration::from_secs(policy.window_secs()));

        let limit = policy.max_requests();
        let current = count.clamp(0, i64::from(u32::MAX)) as u32;
        let reset_at = Utc::now()
            + TimeDelta::from_std(ttl)
                .unwrap_or_else(|_| TimeDelta::seconds(policy.window_secs() as i64));

        if count > i64::from(limit) {
            tracing::warn!(key = %key, current, limit, "Rate limit exceeded");
            Decision {
                allowed: false,
                current,
                limit,
                remaining: 0,
                reset_at,
                retry_after_secs: Some(ttl.as_secs().max(1)),
                key,
                counted: true,
            }
        } else {
            tracing::trace!(key = %key, current, limit, "Request within limit");
            Decision {
                allowed: true,
                current,
                limit,
                remaining: limit.saturating_sub(current),
                reset_at,
                retry_after_secs: None,
                key,
                counted: true,
            }
        }
    }

    /// Build the post-response compensation hook for an allowed decision, if
    /// the policy calls for one.
    ///
    /// Denied requests never compensate (they were never admitted), and
    /// neither do fail-open decisions (nothing was recorded, so nothing may
    /// be decremented).
    pub fn compensation(
        &self,
        policy: &RateLimitPolicy,
        decision: &Decision,
    ) -> Option<CompensationHook> {
        if !decision.allowed || !decision.counted || !policy.compensates() {
            return None;
        }
        Some(CompensationHook {
            key: decision.key.clone(),
            skip_on_success: policy.skips_on_success(),
            skip_on_failure: policy.skips_on_failure(),
            store: self.store.clone(),
        })
    }

    /// Administrative reset: delete all counter keys associated with an
    /// identity across the global, tiered-API, and upload namespaces.
    ///
    /// This path is operational tooling, not the request path, so store
    /// faults surface to the caller instead of failing open. Deleting an
    /// absent key is a no-op by the store contract.
    pub async fn clear_limits(&self, user_id: Uuid) -> Result<(), StoreError> {
        let keys = [
            format!("rate_limit:user:{user_id}"),
            format!("rate_limit:api:user:{user_id}"),
            format!("rate_limit:upload:user:{user_id}"),
        ];
        for key in &keys {
            self.store.delete(key).await?;
        }
        tracing::info!(%user_id, "Cleared rate limit counters");
        Ok(())
    }
}

/// Deferred counter adjustment, run once the wrapped handler's terminal
/// response status is known.
///
/// Carries only the key string, the skip flags, and a store handle - never
/// the request - so it is safe to run after the request context is gone.
pub struct CompensationHook {
    key: String,
    skip_on_success: bool,
    skip_on_failure: bool,
    store: Arc<dyn CounterStore>,
}

impl CompensationHook {
    /// Settle the hook against the final HTTP status. Decrements the counter
    /// when the outcome matches a skip flag; the decrement never resets the
    /// key's TTL. Store faults here are logged and swallowed - the response
    /// has already been decided.
    pub async fn settle(self, status: u16) {
        let skip = (self.skip_on_success && status < 400) || (self.skip_on_failure && status >= 400);
        if !skip {
            return;
        }
        match self.store.decrement(&self.key).await {
            Ok(count) => {
                tracing::debug!(key = %self.key, count, status, "Compensated skipped request");
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Compensation decrement failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::key::KeyScope;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    struct FakeEntry {
        count: i64,
        expires_at: Option<u64>,
    }

    /// Deterministic counter store driven by a logical clock, with
    /// scriptable failures and an expire-call ledger.
    #[derive(Default)]
    struct FakeStore {
        now: AtomicU64,
        entries: Mutex<HashMap<String, FakeEntry>>,
        expire_calls: Mutex<HashMap<String, u32>>,
        fail_all: AtomicBool,
        fail_expire: AtomicBool,
        fail_ttl: AtomicBool,
    }

    impl FakeStore {
        fn advance(&self, secs: u64) {
            self.now.fetch_add(secs, Ordering::SeqCst);
        }

        fn fail_all(&self, fail: bool) {
            self.fail_all.store(fail, Ordering::SeqCst);
        }

        fn fail_expire(&self, fail: bool) {
            self.fail_expire.store(fail, Ordering::SeqCst);
        }

        fn fail_ttl(&self, fail: bool) {
            self.fail_ttl.store(fail, Ordering::SeqCst);
        }

        fn count(&self, key: &str) -> i64 {
            self.entries
                .lock()
                .unwrap()
                .get(key)
                .map(|e| e.count)
                .unwrap_or(0)
        }

        fn expire_calls(&self, key: &str) -> u32 {
            self.expire_calls
                .lock()
                .unwrap()
                .get(key)
                .copied()
                .unwrap_or(0)
        }

        fn check_fail(&self) -> Result<(), StoreError> {
            if self.fail_all.load(Ordering::SeqCst) {
                Err(StoreError::Operation("scripted failure".to_string()))
            } else {
                Ok(())
            }
        }

        fn evict_if_expired(entries: &mut HashMap<String, FakeEntry>, key: &str, now: u64) {
            if let Some(entry) = entries.get(key) {
                if entry.expires_at.is_some_and(|at| at <= now) {
                    entries.remove(key);
                }
            }
        }
    }

    #[async_trait]
    impl CounterStore for FakeStore {
        async fn increment(&self, key: &str) -> Result<i64, StoreError> {
            self.check_fail()?;
            let now = self.now.load(Ordering::SeqCst);
            let mut entries = self.entries.lock().unwrap();
            Self::evict_if_expired(&mut entries, key, now);
            let entry = entries.entry(key.to_string()).or_insert(FakeEntry {
                count: 0,
                expires_at: None,
            });
            entry.count += 1;
            Ok(entry.count)
        }

        async fn decrement(&self, key: &str) -> Result<i64, StoreError> {
            self.check_fail()?;
            let now = self.now.load(Ordering::SeqCst);
            let mut entries = self.entries.lock().unwrap();
            Self::evict_if_expired(&mut entries, key, now);
            let entry = entries.entry(key.to_string()).or_insert(FakeEntry {
                count: 0,
                expires_at: None,
            });
            entry.count -= 1;
            Ok(entry.count)
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
            self.check_fail()?;
            if self.fail_expire.load(Ordering::SeqCst) {
                return Err(StoreError::Operation("scripted expire failure".to_string()));
            }
            *self
                .expire_calls
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_insert(0) += 1;
            let now = self.now.load(Ordering::SeqCst);
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.expires_at = Some(now + ttl.as_secs());
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
            self.check_fail()?;
            if self.fail_ttl.load(Ordering::SeqCst) {
                return Err(StoreError::Timeout);
            }
            let now = self.now.load(Ordering::SeqCst);
            let entries = self.entries.lock().unwrap();
            Ok(entries.get(key).and_then(|e| {
                e.expires_at
                    .filter(|at| *at > now)
                    .map(|at| Duration::from_secs(at - now))
            }))
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.check_fail()?;
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    fn limiter() -> (Arc<FakeStore>, RateLimiter) {
        let store = Arc::new(FakeStore::default());
        let limiter = RateLimiter::new(store.clone());
        (store, limiter)
    }

    fn addr_signals(addr: &str) -> RequestSignals {
        RequestSignals {
            client_addr: Some(addr.to_string()),
            ..Default::default()
        }
    }

    fn policy(window_secs: u64, max: u32) -> RateLimitPolicy {
        RateLimitPolicy::new(Duration::from_secs(window_secs), max).unwrap()
    }

    #[tokio::test]
    async fn counters_are_isolated_per_key() {
        let (store, limiter) = limiter();
        let policy = policy(60, 10);

        for _ in 0..5 {
            limiter.evaluate(&policy, &addr_signals("10.0.0.1")).await;
        }
        let other = limiter.evaluate(&policy, &addr_signals("10.0.0.2")).await;

        assert_eq!(other.current, 1);
        assert_eq!(store.count("rate_limit:10.0.0.1"), 5);
        assert_eq!(store.count("rate_limit:10.0.0.2"), 1);
    }

    #[tokio::test]
    async fn fixed_window_ceiling_allows_again_after_window() {
        let (store, limiter) = limiter();
        let policy = policy(60, 1);
        let signals = addr_signals("10.0.0.1");

        let first = limiter.evaluate(&policy, &signals).await;
        assert!(first.allowed);

        let second = limiter.evaluate(&policy, &signals).await;
        assert!(!second.allowed);
        assert_eq!(second.remaining, 0);

        store.advance(61);
        let third = limiter.evaluate(&policy, &signals).await;
        assert!(third.allowed);
        assert_eq!(third.current, 1);
    }

    #[tokio::test]
    async fn remaining_counts_down_accurately() {
        let (_, limiter) = limiter();
        let policy = policy(60, 10);
        let signals = addr_signals("10.0.0.1");

        let mut last = None;
        for _ in 0..4 {
            last = Some(limiter.evaluate(&policy, &signals).await);
        }
        let fourth = last.unwrap();
        assert!(fourth.allowed);
        assert_eq!(fourth.current, 4);
        assert_eq!(fourth.remaining, 6);
    }

    #[tokio::test]
    async fn ttl_is_set_exactly_once_per_window() {
        let (store, limiter) = limiter();
        let policy = policy(60, 10);
        let signals = addr_signals("10.0.0.1");

        for _ in 0..3 {
            limiter.evaluate(&policy, &signals).await;
        }

        assert_eq!(store.expire_calls("rate_limit:10.0.0.1"), 1);
    }

    #[tokio::test]
    async fn store_errors_fail_open() {
        let (store, limiter) = limiter();
        let policy = policy(60, 1);
        let signals = addr_signals("10.0.0.1");

        // Exhaust the quota, then break the store.
        limiter.evaluate(&policy, &signals).await;
        store.fail_all(true);

        let decision = limiter.evaluate(&policy, &signals).await;
        assert!(decision.allowed);
        assert!(!decision.counted);
        assert_eq!(decision.remaining, policy.max_requests());
        assert!(limiter.compensation(&policy, &decision).is_none());
    }

    #[tokio::test]
    async fn ttl_read_failure_fails_open_even_over_quota() {
        let (store, limiter) = limiter();
        let policy = policy(60, 1);
        let signals = addr_signals("10.0.0.1");

        limiter.evaluate(&policy, &signals).await;
        store.fail_ttl(true);

        let decision = limiter.evaluate(&policy, &signals).await;
        assert!(decision.allowed);
        assert!(!decision.counted);
        assert!(limiter.compensation(&policy, &decision).is_none());
    }

    #[tokio::test]
    async fn expire_failure_fails_open_without_a_hook() {
        let (store, limiter) = limiter();
        let policy = policy(60, 5).skip_on_success();
        let signals = addr_signals("10.0.0.1");

        store.fail_expire(true);

        let decision = limiter.evaluate(&policy, &signals).await;
        assert!(decision.allowed);
        assert!(!decision.counted);
        assert!(limiter.compensation(&policy, &decision).is_none());
    }

    #[tokio::test]
    async fn denied_decision_carries_retry_after() {
        let (_, limiter) = limiter();
        let policy = policy(900, 10);
        let signals = addr_signals("203.0.113.5");

        for i in 1..=10 {
            let decision = limiter.evaluate(&policy, &signals).await;
            assert!(decision.allowed, "request {i} should be allowed");
            assert_eq!(decision.remaining, 10 - i as u32);
        }

        let eleventh = limiter.evaluate(&policy, &signals).await;
        assert!(!eleventh.allowed);
        assert_eq!(eleventh.retry_after_secs, Some(900));
    }

    #[tokio::test]
    async fn skip_on_success_returns_counter_to_zero() {
        let (store, limiter) = limiter();
        let policy = policy(3600, 5).skip_on_success();
        let signals = addr_signals("10.0.0.1");

        for _ in 0..5 {
            let decision = limiter.evaluate(&policy, &signals).await;
            assert!(decision.allowed);
            let hook = limiter.compensation(&policy, &decision).unwrap();
            hook.settle(200).await;
        }

        assert_eq!(store.count("rate_limit:10.0.0.1"), 0);

        // Still room within the same window.
        let next = limiter.evaluate(&policy, &signals).await;
        assert!(next.allowed);
    }

    #[tokio::test]
    async fn skip_on_success_keeps_failures_counted() {
        let (store, limiter) = limiter();
        let policy = policy(3600, 5).skip_on_success();
        let signals = addr_signals("10.0.0.1");

        let decision = limiter.evaluate(&policy, &signals).await;
        let hook = limiter.compensation(&policy, &decision).unwrap();
        hook.settle(500).await;

        assert_eq!(store.count("rate_limit:10.0.0.1"), 1);
    }

    #[tokio::test]
    async fn skip_on_failure_discounts_failures() {
        let (store, limiter) = limiter();
        let policy = policy(900, 10).skip_on_failure();
        let signals = addr_signals("10.0.0.1");

        let decision = limiter.evaluate(&policy, &signals).await;
        let hook = limiter.compensation(&policy, &decision).unwrap();
        hook.settle(404).await;

        assert_eq!(store.count("rate_limit:10.0.0.1"), 0);
    }

    #[tokio::test]
    async fn compensation_never_touches_the_ttl() {
        let (store, limiter) = limiter();
        let policy = policy(3600, 5).skip_on_success();
        let signals = addr_signals("10.0.0.1");

        let decision = limiter.evaluate(&policy, &signals).await;
        let hook = limiter.compensation(&policy, &decision).unwrap();
        hook.settle(200).await;

        assert_eq!(store.expire_calls("rate_limit:10.0.0.1"), 1);
    }

    #[tokio::test]
    async fn no_hook_without_skip_flags_or_when_denied() {
        let (_, limiter) = limiter();
        let plain = policy(60, 1);
        let signals = addr_signals("10.0.0.1");

        let allowed = limiter.evaluate(&plain, &signals).await;
        assert!(limiter.compensation(&plain, &allowed).is_none());

        let skipping = policy(60, 1).skip_on_success();
        let denied = limiter.evaluate(&skipping, &signals).await;
        assert!(!denied.allowed);
        assert!(limiter.compensation(&skipping, &denied).is_none());
    }

    #[tokio::test]
    async fn compensation_failure_is_swallowed() {
        let (store, limiter) = limiter();
        let policy = policy(3600, 5).skip_on_success();
        let signals = addr_signals("10.0.0.1");

        let decision = limiter.evaluate(&policy, &signals).await;
        let hook = limiter.compensation(&policy, &decision).unwrap();

        store.fail_all(true);
        // Must not panic or propagate.
        hook.settle(200).await;

        store.fail_all(false);
        assert_eq!(store.count("rate_limit:10.0.0.1"), 1);
    }

    #[tokio::test]
    async fn clear_limits_starts_a_fresh_window() {
        let (_, limiter) = limiter();
        let user_id = Uuid::from_u128(42);
        let signals = RequestSignals {
            user_id: Some(user_id),
            client_addr: Some("10.0.0.1".to_string()),
            ..Default::default()
        };

        let tiered = catalog::tiered_api("PREMIUM");
        for _ in 0..7 {
            limiter.evaluate(&tiered, &signals).await;
        }
        let upload = catalog::file_upload();
        limiter.evaluate(&upload, &signals).await;

        limiter.clear_limits(user_id).await.unwrap();

        let fresh = limiter.evaluate(&tiered, &signals).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.current, 1);
        assert_eq!(fresh.remaining, tiered.max_requests() - 1);

        let fresh_upload = limiter.evaluate(&upload, &signals).await;
        assert_eq!(fresh_upload.current, 1);
    }

    #[tokio::test]
    async fn clear_limits_tolerates_absent_keys() {
        let (_, limiter) = limiter();
        assert!(limiter.clear_limits(Uuid::from_u128(99)).await.is_ok());
    }

    #[tokio::test]
    async fn email_scoped_policy_buckets_by_email() {
        let (store, limiter) = limiter();
        let policy = policy(60, 1)
            .with_scope(KeyScope::DeclaredEmail)
            .with_namespace("verification");

        let from_one_addr = RequestSignals {
            client_addr: Some("10.0.0.1".to_string()),
            declared_email: Some("user@example.com".to_string()),
            ..Default::default()
        };
        let from_other_addr = RequestSignals {
            client_addr: Some("10.0.0.2".to_string()),
            declared_email: Some("user@example.com".to_string()),
            ..Default::default()
        };

        assert!(limiter.evaluate(&policy, &from_one_addr).await.allowed);
        assert!(!limiter.evaluate(&policy, &from_other_addr).await.allowed);
        assert_eq!(store.count("rate_limit:verification:user@example.com"), 2);
    }
}
