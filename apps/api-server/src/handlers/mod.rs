//! HTTP handlers and route configuration.
//!
//! The handlers are thin stand-ins for the wrapped application; what matters
//! here is how the policy catalog is registered onto the routes.

mod auth;
mod health;
mod strategies;
mod uploads;

use actix_web::web;

use tollgate_core::{RateLimitPolicy, catalog};

use crate::middleware::rate_limit::RateLimit;
use crate::state::AppState;

/// Configure all application routes with their rate-limit stages.
pub fn configure_routes(cfg: &mut web::ServiceConfig, state: &AppState) {
    let stage = |policy: RateLimitPolicy| {
        RateLimit::new(policy, state.limiter.clone(), state.verifier.clone())
    };

    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Auth flows, each with its own tighter policy
            .service(
                web::scope("/auth")
                    .service(
                        web::resource("/login")
                            .route(web::post().to(auth::login))
                            .wrap(stage(catalog::authentication())),
                    )
                    .service(
                        web::resource("/verification-code")
                            .route(web::post().to(auth::verification_code))
                            .wrap(stage(catalog::verification_code())),
                    )
                    .service(
                        web::resource("/password-reset")
                            .route(web::post().to(auth::password_reset))
                            .wrap(stage(catalog::password_reset())),
                    ),
            )
            .service(
                web::resource("/uploads")
                    .route(web::post().to(uploads::upload))
                    .wrap(stage(catalog::file_upload())),
            )
            .service(
                web::resource("/strategies")
                    .route(web::get().to(strategies::list))
                    .wrap(RateLimit::tiered(
                        state.limiter.clone(),
                        state.verifier.clone(),
                    )),
            )
            // The global default guards everything under /api
            .wrap(stage(catalog::global())),
    );
}
