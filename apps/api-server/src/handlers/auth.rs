//! Stand-ins for the wrapped authentication flows.
//!
//! The real handlers live in the wrapped application; these exist so the
//! rate-limit stages in front of them have something to guard.

use actix_web::{HttpResponse, web};
use serde_json::json;

use tollgate_shared::dto::{LoginRequest, PasswordResetRequest, VerificationCodeRequest};
use tollgate_shared::ApiResponse;

/// POST /api/auth/login
pub async fn login(body: web::Json<LoginRequest>) -> HttpResponse {
    tracing::debug!(email = %body.email, "Login attempt");
    HttpResponse::Ok().json(ApiResponse::ok_with_message(
        json!({ "email": body.email }),
        "Credentials accepted",
    ))
}

/// POST /api/auth/verification-code
pub async fn verification_code(body: web::Json<VerificationCodeRequest>) -> HttpResponse {
    tracing::debug!(email = %body.email, "Verification code requested");
    HttpResponse::Ok().json(ApiResponse::ok_with_message(
        json!({ "email": body.email }),
        "Verification code sent",
    ))
}

/// POST /api/auth/password-reset
pub async fn password_reset(body: web::Json<PasswordResetRequest>) -> HttpResponse {
    tracing::debug!(email = %body.email, "Password reset requested");
    HttpResponse::Ok().json(ApiResponse::ok_with_message(
        json!({ "email": body.email }),
        "Password reset email sent",
    ))
}
