//! Counter key derivation.
//!
//! Key derivation is pure and total: it never errors and never panics. When
//! the signal a scope wants is absent it falls back to the next most specific
//! one, bottoming out at a literal "unknown" bucket.

use uuid::Uuid;

/// Root prefix every counter key carries, so limiter keys never collide with
/// anything else living in the same store.
pub const KEY_ROOT: &str = "rate_limit";

const UNKNOWN: &str = "unknown";

/// Which request signal a policy buckets on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    /// Client network address (the default).
    ClientAddress,
    /// Email address declared in the request body, falling back to the
    /// client address.
    DeclaredEmail,
    /// Authenticated user id, falling back to the client address.
    UserId,
}

/// Identity signals extracted from an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestSignals {
    pub client_addr: Option<String>,
    pub user_id: Option<Uuid>,
    pub declared_email: Option<String>,
}

/// Derive the full counter key for a scope, optional policy namespace, and
/// set of request signals.
pub fn derive_key(scope: KeyScope, namespace: Option<&str>, signals: &RequestSignals) -> String {
    let part = match scope {
        KeyScope::ClientAddress => signals
            .client_addr
            .clone()
            .unwrap_or_else(|| UNKNOWN.to_string()),
        KeyScope::DeclaredEmail => signals
            .declared_email
            .clone()
            .or_else(|| signals.client_addr.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        KeyScope::UserId => signals
            .user_id
            .map(|id| format!("user:{id}"))
            .or_else(|| signals.client_addr.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
    };

    match namespace {
        Some(ns) => format!("{KEY_ROOT}:{ns}:{part}"),
        None => format!("{KEY_ROOT}:{part}"),
    }
}
