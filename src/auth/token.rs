//! Session token codec.
//!
//! Session tokens are HS256-signed JWTs carried in the `token` cookie. They are
//! never stored server side; every request re-derives the claims from the
//! cookie value.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::db::{Role, User};

/// Name of the cookie holding the session token
pub const SESSION_COOKIE: &str = "token";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("session token not found")]
    NotFound,
    #[error("invalid session token")]
    Invalid,
    #[error("session token expired")]
    Expired,
    #[error("failed to sign session token: {0}")]
    Signing(String),
}

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub email: String,
    pub verified: bool,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Signs and verifies session tokens.
///
/// There is a single issuance path: every flow (registration, login,
/// verification) produces the same claim set with the same lifetime.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
    issuer: String,
    audience: String,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl_seconds: u64, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_seconds: ttl_seconds.min(i64::MAX as u64) as i64,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        }
    }

    /// Codec for the configured secret, or for a fresh random one when unset
    pub fn from_config(config: &AuthConfig) -> Self {
        let secret = match config.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        Self::new(
            &secret,
            config.token_ttl_seconds,
            &config.issuer,
            &config.audience,
        )
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Build the claim set for a user, valid from now for the configured lifetime
    pub fn claims_for(&self, user: &User) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role_enum(),
            email: user.email.clone(),
            verified: user.verified,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(self.ttl_seconds),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.sign(&self.claims_for(user))
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a raw token and return its claims.
    ///
    /// Only HS256 is accepted; any other algorithm in the header is rejected
    /// as `Invalid`, even when it is another HMAC variant.
    pub fn verify(&self, token: Option<&str>) -> Result<Claims, TokenError> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(TokenError::NotFound),
        };

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}
