//! Authentication and authorization utilities
//!
//! Provides:
//! - JWT token generation and validation
//! - Caller identity extraction for handlers
//! - Callback credentials for the external computation service

use crate::errors::{AppError, Result};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Identity of the user behind a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub is_moderator: bool,
}

impl Caller {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            is_moderator: false,
        }
    }

    pub fn moderator(user_id: i64) -> Self {
        Self {
            user_id,
            is_moderator: true,
        }
    }

    /// Require the moderator role, returning error if absent
    pub fn require_moderator(&self) -> Result<()> {
        if self.is_moderator {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                message: "Moderator role required".to_string(),
            })
        }
    }

    /// Owners and moderators may read or annotate a request
    pub fn can_view(&self, owner_id: i64) -> bool {
        self.is_moderator || self.user_id == owner_id
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    pub user_id: i64,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub is_moderator: bool,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Generate a new JWT token
    pub fn generate_token(&self, user_id: i64, username: &str, is_moderator: bool) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            user_id,
            username: username.to_string(),
            is_moderator,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::Unauthorized {
                    message: "Invalid bearer token".to_string(),
                },
            })
    }
}

/// Extract the token from an `Authorization: Bearer ...` header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum extractor for the calling user
impl<S> FromRequestParts<S> for Caller
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let token = extract_bearer(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Authorization header must be a Bearer token".to_string(),
        })?;

        let jwt = Arc::<JwtManager>::from_ref(state);
        let claims = jwt.validate_token(token)?;

        Ok(Caller {
            user_id: claims.user_id,
            is_moderator: claims.is_moderator,
        })
    }
}

/// Credential shared with the external computation service.
///
/// `token` goes out with every dispatch; `verify` checks the token presented
/// on an incoming result.
pub trait CallbackCredential: Send + Sync {
    fn token(&self) -> &str;

    fn verify(&self, presented: &str) -> bool;
}

/// Single static secret compared by exact match
#[derive(Clone)]
pub struct SharedSecret {
    secret: String,
    digest: [u8; 32],
}

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        let digest = sha256(&secret);
        Self { secret, digest }
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret").finish_non_exhaustive()
    }
}

impl CallbackCredential for SharedSecret {
    fn token(&self) -> &str {
        &self.secret
    }

    // An unset secret accepts nothing
    fn verify(&self, presented: &str) -> bool {
        !self.secret.is_empty() && sha256(presented) == self.digest
    }
}

fn sha256(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}

/// Hex fingerprint of a secret, safe to log
pub fn fingerprint(secret: &str) -> String {
    hex::encode(&sha256(secret)[..4])
}
