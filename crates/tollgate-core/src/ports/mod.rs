//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod counter_store;
mod identity;

pub use counter_store::{CounterStore, StoreError};
pub use identity::{CallerIdentity, IdentityError, TokenVerifier};
