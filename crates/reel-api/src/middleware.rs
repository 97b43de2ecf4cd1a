use axum::{
    extract::{Query, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::debug;

use reel_types::api::Claims;

use crate::auth::{AppState, decode_token};
use crate::error::ServiceError;

#[derive(Debug, Deserialize)]
struct TokenParam {
    token: Option<String>,
}

/// Token from `Authorization: Bearer`, or failing that the `token` query
/// parameter.
fn bearer_token(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    from_header.or_else(|| {
        Query::<TokenParam>::try_from_uri(req.uri())
            .ok()
            .and_then(|Query(param)| param.token)
            .filter(|token| !token.is_empty())
    })
}

fn verified_claims(state: &AppState, req: &Request) -> Option<Claims> {
    let token = bearer_token(req)?;
    match decode_token(&state.jwt_secret, &token) {
        Ok(claims) => Some(claims),
        Err(_) => {
            debug!(path = %req.uri().path(), "rejected token");
            None
        }
    }
}

/// Rejects requests without a valid token; otherwise stores its claims for
/// the `AuthUser` extractor.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let claims = verified_claims(&state, &req).ok_or(ServiceError::Unauthorized)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Like `require_auth`, but a missing or invalid token leaves the request
/// anonymous.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(claims) = verified_claims(&state, &req) {
        req.extensions_mut().insert(claims);
    }
    next.run(req).await
}
