//! # Tollgate Core
//!
//! The domain layer of the Tollgate rate-limiting subsystem.
//! This crate contains the limiter logic, policies, and the ports that
//! infrastructure must implement. Zero infrastructure dependencies.

pub mod catalog;
pub mod decision;
pub mod key;
pub mod limiter;
pub mod policy;
pub mod ports;

pub use catalog::MembershipTier;
pub use decision::Decision;
pub use key::{KeyScope, RequestSignals};
pub use limiter::{CompensationHook, RateLimiter};
pub use policy::{PolicyError, RateLimitPolicy};
pub use ports::{CallerIdentity, CounterStore, IdentityError, StoreError, TokenVerifier};
