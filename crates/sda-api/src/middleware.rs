//! Authentication middleware (§4.4): every mutating endpoint requires a
//! valid JWT whose `sub` is in the admin allow-list; `GET /files` requires
//! only a valid JWT.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{auth::Claims, error::ApiError, AppState};

/// Claims attached to the request by [`require_token`], read back out by
/// handlers via `request.extensions()`.
#[derive(Clone)]
pub struct AuthedUser(pub Claims);

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Require a JWT that verifies against a known key; reject with 401
/// `no access token supplied` otherwise — covering both a missing header
/// and a token none of the configured keys can verify (§6).
pub async fn require_token(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::NoToken)?;
    let claims = state.verifier.verify(token).ok_or(ApiError::NoToken)?;
    req.extensions_mut().insert(AuthedUser(claims));
    Ok(next.run(req).await)
}

/// Require the authenticated `sub` (attached by [`require_token`], which
/// must run first) to appear in the configured admin allow-list; reject
/// with 401 `not authorized` otherwise (§6, scenario 2).
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let authed = req
        .extensions()
        .get::<AuthedUser>()
        .ok_or(ApiError::NoToken)?;
    if !state.is_admin(&authed.0.sub) {
        return Err(ApiError::NotAuthorized);
    }
    Ok(next.run(req).await)
}
