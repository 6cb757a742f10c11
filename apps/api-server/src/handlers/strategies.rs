//! Stand-in for the wrapped tiered API listing.

use actix_web::HttpResponse;
use serde_json::json;

use tollgate_shared::ApiResponse;

use crate::middleware::auth::Caller;

/// GET /api/strategies
pub async fn list(caller: Caller) -> HttpResponse {
    let membership = caller.0.map(|c| c.membership);
    HttpResponse::Ok().json(ApiResponse::ok(json!({
        "membership": membership,
        "strategies": [],
    })))
}
