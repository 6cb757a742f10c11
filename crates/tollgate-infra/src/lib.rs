//! # Tollgate Infrastructure
//!
//! Concrete implementations of the ports defined in `tollgate-core`:
//! counter stores (Redis and in-memory) and the JWT identity adapter.

pub mod auth;
pub mod clock;
pub mod store;

pub use auth::{JwtConfig, JwtTokenVerifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{MemoryCounterStore, RedisCounterStore, RedisStoreConfig};
