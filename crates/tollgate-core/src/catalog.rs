//! The policy catalog: the fixed set of named policies the pipeline wires
//! onto routes, plus membership-tier resolution for the dynamic API policy.
//!
//! The static constructors use `expect` deliberately: their parameters are
//! compile-time constants, and a failure here is a programming error that
//! must abort startup, not a runtime condition.

use std::time::Duration;

use crate::key::KeyScope;
use crate::policy::RateLimitPolicy;

/// Global default: 100 requests per 15 minutes per client address.
pub fn global() -> RateLimitPolicy {
    RateLimitPolicy::new(Duration::from_secs(15 * 60), 100)
        .expect("static policy is valid")
        .with_message("Too many requests, please try again later.")
}

/// Authentication attempts: 10 per 15 minutes per client address.
pub fn authentication() -> RateLimitPolicy {
    RateLimitPolicy::new(Duration::from_secs(15 * 60), 10)
        .expect("static policy is valid")
        .with_namespace("auth")
        .with_message("Too many authentication attempts, please try again later.")
}

/// Verification-code issuance: 1 per minute per declared email.
pub fn verification_code() -> RateLimitPolicy {
    RateLimitPolicy::new(Duration::from_secs(60), 1)
        .expect("static policy is valid")
        .with_scope(KeyScope::DeclaredEmail)
        .with_namespace("verification")
        .with_message("Please wait before requesting another verification code.")
}

/// Password-reset requests: 5 per hour per declared email.
pub fn password_reset() -> RateLimitPolicy {
    RateLimitPolicy::new(Duration::from_secs(60 * 60), 5)
        .expect("static policy is valid")
        .with_scope(KeyScope::DeclaredEmail)
        .with_namespace("password_reset")
        .with_message("Too many password reset requests, please try again later.")
}

/// File uploads: 10 per hour per authenticated user.
pub fn file_upload() -> RateLimitPolicy {
    RateLimitPolicy::new(Duration::from_secs(60 * 60), 10)
        .expect("static policy is valid")
        .with_scope(KeyScope::UserId)
        .with_namespace("upload")
        .with_message("Upload limit reached, please try again later.")
}

/// Tiered API usage: per-hour ceiling resolved from the caller's membership
/// level, keyed by user id. Synthesized per request.
pub fn tiered_api(membership_level: &str) -> RateLimitPolicy {
    let tier = MembershipTier::resolve(membership_level);
    RateLimitPolicy::new(Duration::from_secs(60 * 60), tier.max_requests())
        .expect("static policy is valid")
        .with_scope(KeyScope::UserId)
        .with_namespace("api")
        .with_message("API rate limit exceeded for your membership tier.")
}

/// Subscription tiers recognized by the tiered API policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipTier {
    Basic,
    Premium,
    Professional,
}

impl MembershipTier {
    /// Resolve a raw membership level string. Unrecognized levels resolve to
    /// `Basic`, a lookup-or-default table rather than an error.
    pub fn resolve(level: &str) -> Self {
        match level {
            "PREMIUM" => Self::Premium,
            "PROFESSIONAL" => Self::Professional,
            _ => Self::Basic,
        }
    }

    /// Hourly request ceiling for this tier.
    pub fn max_requests(self) -> u32 {
        match self {
            Self::Basic => 100,
            Self::Premium => 500,
            Self::Professional => 1000,
        }
    }
}
