//! JWT bearer verification.
//!
//! Tokens are minted by the wrapped application; this adapter only verifies
//! them and extracts the identity signals the limiter consumes.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tollgate_core::{CallerIdentity, IdentityError, TokenVerifier};

/// JWT verification configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production".to_string(),
        }
    }
}

/// Claims carried in the tokens the wrapped application issues.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String, // user_id
    #[serde(default)]
    membership: String,
    exp: i64,
}

/// HS256 token verifier implementing the consumed identity capability.
pub struct JwtTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenVerifier {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    pub fn from_env() -> Self {
        let secret =
            std::env::var("JWT_SECRET").unwrap_or_else(|_| "change-me-in-production".to_string());

        if secret == "change-me-in-production" {
            tracing::warn!("Using default JWT secret. Set JWT_SECRET for production use.");
        }

        Self::new(JwtConfig { secret })
    }
}

impl TokenVerifier for JwtTokenVerifier {
    fn verify(&self, token: &str) -> Result<CallerIdentity, IdentityError> {
        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => IdentityError::TokenExpired,
                    _ => IdentityError::InvalidToken(e.to_string()),
                }
            })?;

        let user_id = Uuid::parse_str(&token_data.claims.sub)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        Ok(CallerIdentity {
            user_id,
            membership: token_data.claims.membership,
        })
    }
}
