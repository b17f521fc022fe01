//! Handshake token validation.
//!
//! The gateway does not own users or credentials. It only asks a
//! [`TokenValidator`] which user a token was issued for. [`JwtValidator`]
//! implements that contract for HS256-signed JWTs whose `sub` claim is the
//! decimal user id.

use std::fmt;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::error::GatewayError;

/// External authentication collaborator.
pub trait TokenValidator: Send + Sync + fmt::Debug {
    /// Resolves `token` to the user it was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Authentication`] when the token is missing,
    /// malformed, expired, or carries an invalid signature.
    fn validate(&self, token: &str) -> Result<UserId, GatewayError>;
}

/// Claims carried by gateway access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: decimal user id.
    pub sub: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issuer, checked when the validator is configured with one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// HS256 JWT validator backed by a shared secret.
pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: Option<String>,
}

impl JwtValidator {
    /// Creates a validator for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &[u8], issuer: Option<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer,
        }
    }

    /// Mints a token for `user_id` valid for `ttl_secs` seconds.
    ///
    /// Used by local tooling and tests; production tokens come from the
    /// platform's identity service signed with the same secret.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if signing fails.
    pub fn issue(&self, user_id: UserId, ttl_secs: i64) -> Result<String, GatewayError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| GatewayError::Internal(format!("token signing failed: {e}")))
    }
}

impl TokenValidator for JwtValidator {
    fn validate(&self, token: &str) -> Result<UserId, GatewayError> {
        if token.trim().is_empty() {
            return Err(GatewayError::Authentication("missing token".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| GatewayError::Authentication(e.to_string()))?;

        data.claims
            .sub
            .parse()
            .map_err(|_| GatewayError::Authentication("subject is not a user id".to_string()))
    }
}

impl fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtValidator")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}
