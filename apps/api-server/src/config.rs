//! Application configuration loaded from environment variables.

use std::env;

use tollgate_infra::RedisStoreConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Redis counter store configuration; absent means the process-local
    /// in-memory store is used.
    pub store: Option<RedisStoreConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let store = env::var("REDIS_URL").ok().map(|_| RedisStoreConfig::from_env());

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            store,
        }
    }
}
