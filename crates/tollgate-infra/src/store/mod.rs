//! Counter store implementations.

mod memory;
mod redis;

pub use memory::MemoryCounterStore;
pub use redis::{RedisCounterStore, RedisStoreConfig};
