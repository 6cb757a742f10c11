//! Per-request rate limit decisions.

use chrono::{DateTime, TimeDelta, Utc};

use crate::policy::RateLimitPolicy;

/// Outcome of a rate limit evaluation. Created and discarded within a single
/// request's lifetime.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    /// Post-increment count observed for this request (clamped at zero).
    pub current: u32,
    pub limit: u32,
    /// `max(0, limit - current)`.
    pub remaining: u32,
    /// When the current window closes.
    pub reset_at: DateTime<Utc>,
    /// Populated only when denied.
    pub retry_after_secs: Option<u64>,
    /// The derived counter key, carried so compensation can target it
    /// without holding onto the request.
    pub key: String,
    /// Whether the increment round trip actually happened. False on the
    /// fail-open path, where nothing was recorded and nothing may later be
    /// decremented.
    pub counted: bool,
}

impl Decision {
    /// Best-effort allowed decision used when the counter store is
    /// unreachable: the request proceeds, headers get defaults, and no
    /// compensation hook may be attached.
    pub(crate) fn fail_open(policy: &RateLimitPolicy, key: String) -> Self {
        let limit = policy.max_requests();
        Self {
            allowed: true,
            current: 0,
            limit,
            remaining: limit,
            reset_at: Utc::now() + TimeDelta::seconds(policy.window_secs() as i64),
            retry_after_secs: None,
            key,
            counted: false,
        }
    }
}
