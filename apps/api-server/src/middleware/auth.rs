//! Bearer authentication helper and extractor.
//!
//! The rate-limiting subsystem consumes identity, it does not enforce it:
//! an absent or invalid token means an anonymous caller, never an error.

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, web};
use std::future::{Ready, ready};

use tollgate_core::{CallerIdentity, TokenVerifier};

use crate::state::AppState;

/// Resolve the caller identity from an `Authorization: Bearer` header.
pub(crate) fn bearer_identity(
    headers: &header::HeaderMap,
    verifier: &dyn TokenVerifier,
) -> Option<CallerIdentity> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth.strip_prefix("Bearer ")?;

    match verifier.verify(token) {
        Ok(identity) => Some(identity),
        Err(e) => {
            tracing::debug!(error = %e, "Bearer token rejected, treating caller as anonymous");
            None
        }
    }
}

/// Optional caller extractor for handlers. Never fails.
pub struct Caller(pub Option<CallerIdentity>);

impl FromRequest for Caller {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let identity = req
            .app_data::<web::Data<AppState>>()
            .and_then(|state| bearer_identity(req.headers(), state.verifier.as_ref()));

        ready(Ok(Caller(identity)))
    }
}
