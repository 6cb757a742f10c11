//! Stand-in for the wrapped file upload flow.

use actix_web::HttpResponse;
use serde_json::json;

use tollgate_shared::ApiResponse;

use crate::middleware::auth::Caller;

/// POST /api/uploads
pub async fn upload(caller: Caller) -> HttpResponse {
    let user = caller.0.map(|c| c.user_id.to_string());
    HttpResponse::Ok().json(ApiResponse::ok_with_message(
        json!({ "user": user }),
        "Upload accepted",
    ))
}
