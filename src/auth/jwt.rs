//! JWT issuance and validation

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Actor;

/// JWT-related errors
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Developer,
    Lender,
    Admin,
}

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Organization the user acts for, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn actor(&self) -> Result<Actor, JwtError> {
        let user_id =
            Uuid::parse_str(&self.sub).map_err(|e| JwtError::InvalidToken(e.to_string()))?;
        let organization_id = self
            .org
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| JwtError::InvalidToken(e.to_string()))?;

        Ok(Actor {
            user_id,
            organization_id,
        })
    }
}

/// Sign a token for an actor
pub fn issue_token(
    actor: &Actor,
    role: Role,
    secret: &str,
    ttl_seconds: i64,
) -> Result<String, JwtError> {
    let now = Utc::now();
    let claims = Claims {
        sub: actor.user_id.to_string(),
        org: actor.organization_id.map(|id| id.to_string()),
        role,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::EncodingFailed(e.to_string()))
}

/// Verify and decode a JWT token
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        _ => JwtError::DecodingFailed(e.to_string()),
    })?;

    Ok(token_data.claims)
}

/// Shared verification key, extracted from router state
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Arc<str>,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Arc::from(secret),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        verify_token(token, &self.secret)
    }
}
