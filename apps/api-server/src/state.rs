//! Application state - shared across all handlers and pipeline stages.

use std::sync::Arc;

use tollgate_core::{CounterStore, RateLimiter, TokenVerifier};
use tollgate_infra::{JwtTokenVerifier, MemoryCounterStore, RedisCounterStore, RedisStoreConfig};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    ///
    /// Redis is preferred when configured; if it is unreachable at startup
    /// the server falls back to the process-local in-memory store rather
    /// than refusing to start.
    pub async fn new(store_config: Option<&RedisStoreConfig>) -> Self {
        let store: Arc<dyn CounterStore> = match store_config {
            Some(config) => match RedisCounterStore::new(config.clone()).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Redis unreachable, falling back to in-memory counter store"
                    );
                    Arc::new(MemoryCounterStore::new())
                }
            },
            None => {
                tracing::info!("REDIS_URL not set, using in-memory counter store");
                Arc::new(MemoryCounterStore::new())
            }
        };

        let limiter = Arc::new(RateLimiter::new(store));
        let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtTokenVerifier::from_env());

        tracing::info!("Application state initialized");

        Self { limiter, verifier }
    }
}
