//! Rate limiting pipeline stage.
//!
//! A `Transform`/`Service` pair holding a policy selection and the limiter.
//! On each request it derives the identity signals, asks the limiter for a
//! decision, and either short-circuits with the 429 envelope or forwards to
//! the wrapped handler, attaching quota headers and settling the
//! compensation hook once the terminal status is known.

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::EitherBody,
    dev::{self, Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{self, HeaderName, HeaderValue},
    web::BytesMut,
};
use futures::StreamExt;

use tollgate_core::{catalog, Decision, KeyScope, RateLimitPolicy, RateLimiter, RequestSignals, TokenVerifier};
use tollgate_shared::ErrorBody;

use super::auth::bearer_identity;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Request bodies larger than this are not inspected for a declared email;
/// the key derivation falls back to the client address instead.
const EMAIL_PEEK_LIMIT: usize = 16 * 1024;

/// How a pipeline stage picks its policy.
enum PolicySelector {
    /// One policy, fixed at registration time.
    Fixed(RateLimitPolicy),
    /// Synthesized per request from the caller's membership tier. Anonymous
    /// callers bypass the stage entirely.
    TieredApi,
}

/// Rate limiting middleware factory.
pub struct RateLimit {
    selector: Rc<PolicySelector>,
    limiter: Arc<RateLimiter>,
    verifier: Arc<dyn TokenVerifier>,
}

impl RateLimit {
    /// Stage enforcing one fixed policy.
    pub fn new(
        policy: RateLimitPolicy,
        limiter: Arc<RateLimiter>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            selector: Rc::new(PolicySelector::Fixed(policy)),
            limiter,
            verifier,
        }
    }

    /// Stage enforcing the membership-tier API policy.
    pub fn tiered(limiter: Arc<RateLimiter>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            selector: Rc::new(PolicySelector::TieredApi),
            limiter,
            verifier,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service: Rc::new(service),
            selector: self.selector.clone(),
            limiter: self.limiter.clone(),
            verifier: self.verifier.clone(),
        }))
    }
}

pub struct RateLimitService<S> {
    service: Rc<S>,
    selector: Rc<PolicySelector>,
    limiter: Arc<RateLimiter>,
    verifier: Arc<dyn TokenVerifier>,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let selector = self.selector.clone();
        let limiter = self.limiter.clone();
        let verifier = self.verifier.clone();

        Box::pin(async move {
            let identity = bearer_identity(req.headers(), verifier.as_ref());

            let policy = match selector.as_ref() {
                PolicySelector::Fixed(policy) => policy.clone(),
                PolicySelector::TieredApi => match &identity {
                    Some(caller) => catalog::tiered_api(&caller.membership),
                    None => {
                        // No authenticated caller: tiered limiting is
                        // skipped entirely, headers and all.
                        let res = service.call(req).await?;
                        return Ok(res.map_into_left_body());
                    }
                },
            };

            let mut signals = RequestSignals {
                client_addr: req
                    .connection_info()
                    .realip_remote_addr()
                    .map(str::to_owned),
                user_id: identity.as_ref().map(|caller| caller.user_id),
                declared_email: None,
            };
            if policy.scope() == KeyScope::DeclaredEmail {
                signals.declared_email = peek_declared_email(&mut req).await;
            }

            let decision = limiter.evaluate(&policy, &signals).await;

            if !decision.allowed {
                let response = reject(&policy, &decision);
                let (http_req, _payload) = req.into_parts();
                let srv_response = ServiceResponse::new(http_req, response);
                return Ok(srv_response.map_into_right_body());
            }

            // Created before the request is handed over: the hook carries
            // only the key string and a store handle, so it outlives the
            // request context safely.
            let hook = limiter.compensation(&policy, &decision);

            let mut res = service.call(req).await?;
            let status = res.status().as_u16();

            annotate(res.headers_mut(), &decision);

            if let Some(hook) = hook {
                hook.settle(status).await;
            }

            Ok(res.map_into_left_body())
        })
    }
}

/// Build the 429 short-circuit response.
fn reject(policy: &RateLimitPolicy, decision: &Decision) -> HttpResponse {
    let retry_after = decision
        .retry_after_secs
        .unwrap_or_else(|| policy.window_secs());

    HttpResponse::TooManyRequests()
        .insert_header((header::RETRY_AFTER, retry_after.to_string()))
        .insert_header((LIMIT_HEADER, decision.limit.to_string()))
        .insert_header((REMAINING_HEADER, "0"))
        .insert_header((RESET_HEADER, decision.reset_at.to_rfc3339()))
        .json(ErrorBody::rate_limited(policy.message(), retry_after))
}

/// Attach the quota headers to an allowed response. When stages nest, the
/// innermost (most specific) stage runs first on the way out; outer stages
/// must not clobber headers that are already present.
fn annotate(headers: &mut header::HeaderMap, decision: &Decision) {
    if headers.contains_key(LIMIT_HEADER) {
        return;
    }
    let pairs = [
        (LIMIT_HEADER, decision.limit.to_string()),
        (REMAINING_HEADER, decision.remaining.to_string()),
        (RESET_HEADER, decision.reset_at.to_rfc3339()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

/// Buffer up to [`EMAIL_PEEK_LIMIT`] of the request body, read the declared
/// email out of it, and restore the payload for the wrapped handler.
/// Malformed or oversized bodies simply yield no email, letting key
/// derivation fall back to the client address. Never holds more than the
/// peek limit plus one chunk in memory; whatever was consumed is replayed
/// ahead of the untouched remainder of the stream, including a chunk error,
/// which is left for the inner extractor to handle.
async fn peek_declared_email(req: &mut ServiceRequest) -> Option<String> {
    let mut payload = req.take_payload();
    let mut buf = BytesMut::new();
    let mut chunk_error = None;
    let mut truncated = false;
    while let Some(chunk) = payload.next().await {
        match chunk {
            Ok(chunk) => {
                buf.extend_from_slice(&chunk);
                if buf.len() > EMAIL_PEEK_LIMIT {
                    truncated = true;
                    break;
                }
            }
            Err(e) => {
                chunk_error = Some(e);
                break;
            }
        }
    }
    let bytes = buf.freeze();

    let email = if !truncated && chunk_error.is_none() {
        serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|body| body.get("email").and_then(|e| e.as_str()).map(str::to_owned))
    } else {
        None
    };

    let mut replay: Vec<Result<_, actix_web::error::PayloadError>> = vec![Ok(bytes)];
    if let Some(e) = chunk_error {
        replay.push(Err(e));
    }
    let restored = futures::stream::iter(replay).chain(payload);
    req.set_payload(dev::Payload::Stream {
        payload: Box::pin(restored),
    });

    email
}
