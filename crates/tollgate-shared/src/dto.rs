//! Data Transfer Objects - request types for the wrapped flows.

use serde::{Deserialize, Serialize};

/// Request to login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request to have a verification code issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCodeRequest {
    pub email: String,
}

/// Request to start a password reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}
