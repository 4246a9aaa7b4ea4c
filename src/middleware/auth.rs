//! Caller extraction from the `Authorization: Bearer` header

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::auth::{JwtError, Role, TokenVerifier};
use crate::error::AppError;
use crate::models::Actor;

/// Caller of a protected route
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub actor: Actor,
    pub role: Role,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    TokenVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AppError::Unauthorized(
                        "Authorization header with Bearer token required".to_string(),
                    )
                })?;

        let claims = TokenVerifier::from_ref(state)
            .verify(bearer.token())
            .map_err(|e| match e {
                JwtError::TokenExpired => AppError::Unauthorized("Token has expired".to_string()),
                _ => AppError::Unauthorized("Invalid token".to_string()),
            })?;

        let actor = claims
            .actor()
            .map_err(|_| AppError::Unauthorized("Invalid subject in token".to_string()))?;

        Ok(AuthenticatedUser {
            actor,
            role: claims.role,
        })
    }
}
