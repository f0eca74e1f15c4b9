//! # Identity Tokens
//!
//! Tokens are HS256 JWTs issued by the identity provider and only verified here.
//!
//! ## Claims
//!
//! ```json
//! { "user": { "id": "...", "role": "student", "rollNo": "21CS001" }, "iat": 1761994800, "exp": 1761998400 }
//! ```
//!
//! - Shared secret with the provider, `AUTH_TOKEN_SECRET`
//! - `exp` is required and checked with no leeway
//!
//! Clients send it in the `x-auth-token` header.
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{error::AppError, identity::Identity, state::State};

pub const AUTH_HEADER: &str = "x-auth-token";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("No token, authorization denied")]
    Missing,

    #[error("Token is not valid")]
    Malformed,

    #[error("Token signature mismatch")]
    BadSignature,

    #[error("Token expired")]
    Expired,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::BadSignature,
            _ => AuthError::Malformed,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Claims {
    user: Identity,
    #[serde(default)]
    iat: i64,
    exp: i64,
}

pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Signs a token for `identity` issued at `now`, valid for `ttl`.
    pub fn sign(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            user: identity.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;

        Ok(data.claims.user)
    }
}

impl FromRequestParts<Arc<State>> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTH_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::Missing)?;

        state.tokens.verify(token).map_err(|e| {
            debug!("Rejected token: {e}");
            AppError::from(e)
        })
    }
}
