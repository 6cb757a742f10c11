//! Middleware modules.

pub mod auth;
pub mod rate_limit;
