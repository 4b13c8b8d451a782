use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use crate::{dispatcher::constant_time_eq, error::ApiError, state::AppState};

/// Guards the `/internal` routes with the configured inspector token.
///
/// Requests pass untouched when no token is configured.
pub async fn inspector_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.inspector_api_token.as_deref() {
        let provided = bearer_token(req.headers()).ok_or_else(|| {
            ApiError::unauthorized("missing or invalid Authorization header")
        })?;
        if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
            return Err(ApiError::unauthorized("invalid token"));
        }
    }

    Ok(next.run(req).await)
}

/// `Authorization: Bearer <token>`, scheme matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
