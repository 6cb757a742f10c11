//! Consumed identity capability.
//!
//! The limiter does not authenticate anybody; it consumes an
//! already-existing verification capability to learn who the caller is for
//! user-scoped keys and membership-tier resolution.

use uuid::Uuid;

/// The authenticated caller, as far as rate limiting cares.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    /// Subscription level string, e.g. "BASIC" / "PREMIUM" / "PROFESSIONAL".
    pub membership: String,
}

/// Bearer token verification.
pub trait TokenVerifier: Send + Sync {
    /// Validate a token and extract the caller identity.
    fn verify(&self, token: &str) -> Result<CallerIdentity, IdentityError>;
}

/// Identity verification errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}
