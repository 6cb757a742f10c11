//! Rate limit policy configuration.

use std::time::Duration;

use crate::key::{self, KeyScope, RequestSignals};

const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

/// Immutable rate limit policy: window, ceiling, key derivation, and
/// skip-on-outcome accounting flags.
///
/// Invalid configurations are rejected at construction time, never at
/// request time.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    window: Duration,
    max_requests: u32,
    scope: KeyScope,
    namespace: Option<String>,
    message: String,
    skip_on_success: bool,
    skip_on_failure: bool,
}

impl RateLimitPolicy {
    /// Create a policy with the default (client address) scope.
    pub fn new(window: Duration, max_requests: u32) -> Result<Self, PolicyError> {
        if max_requests == 0 {
            return Err(PolicyError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        Ok(Self {
            window,
            max_requests,
            scope: KeyScope::ClientAddress,
            namespace: None,
            message: DEFAULT_MESSAGE.to_string(),
            skip_on_success: false,
            skip_on_failure: false,
        })
    }

    pub fn with_scope(mut self, scope: KeyScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Do not count requests whose terminal response is a success (< 400).
    pub fn skip_on_success(mut self) -> Self {
        self.skip_on_success = true;
        self
    }

    /// Do not count requests whose terminal response is a failure (>= 400).
    pub fn skip_on_failure(mut self) -> Self {
        self.skip_on_failure = true;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in whole seconds, rounded up, as stored in the key's
    /// expiration.
    pub fn window_secs(&self) -> u64 {
        let secs = self.window.as_secs();
        if self.window.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn scope(&self) -> KeyScope {
        self.scope
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn skips_on_success(&self) -> bool {
        self.skip_on_success
    }

    pub fn skips_on_failure(&self) -> bool {
        self.skip_on_failure
    }

    /// Whether this policy compensates based on the response outcome at all.
    pub fn compensates(&self) -> bool {
        self.skip_on_success || self.skip_on_failure
    }

    /// Full counter key for a request under this policy.
    pub fn counter_key(&self, signals: &RequestSignals) -> String {
        key::derive_key(self.scope, self.namespace(), signals)
    }
}

/// Policy configuration errors, raised at construction time.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("max_requests must be greater than zero")]
    ZeroLimit,

    #[error("window must be greater than zero")]
    ZeroWindow,
}
