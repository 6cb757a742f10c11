//! Standardized API response envelopes.

use serde::{Deserialize, Serialize};

/// Standard successful API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

/// Error envelope for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: u16,
    pub message: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// ISO-8601 timestamp of when the error was produced.
    pub timestamp: String,
}

impl ErrorBody {
    pub fn new(code: u16, message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
            error_code: error_code.into(),
            retry_after: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// The 429 rejection body: the policy's message plus how long the caller
    /// should wait.
    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        let mut body = Self::new(429, message, "RATE_LIMIT_EXCEEDED");
        body.retry_after = Some(retry_after_secs);
        body
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message, "BAD_REQUEST")
    }

    pub fn unauthorized() -> Self {
        Self::new(401, "Authentication required", "UNAUTHORIZED")
    }

    pub fn internal_error() -> Self {
        Self::new(500, "Internal server error", "INTERNAL_ERROR")
    }
}
