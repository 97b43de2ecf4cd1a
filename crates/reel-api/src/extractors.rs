use axum::{extract::FromRequestParts, http::request::Parts};

use reel_types::api::Claims;
use reel_types::models::UserId;

use crate::error::ServiceError;

/// Caller identity set by `require_auth`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .map(|claims| AuthUser(claims.sub))
            .ok_or(ServiceError::Unauthorized)
    }
}

/// Caller identity set by `optional_auth`, if a valid token was presented.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<UserId>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Claims>().map(|claims| claims.sub)))
    }
}
