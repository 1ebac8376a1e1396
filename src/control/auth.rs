use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::security::constant_time_compare;

/// Require `Authorization: Bearer <api_key>`.
pub async fn api_key_middleware(
    State(api_key): State<Arc<str>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if constant_time_compare(token, &api_key) => Ok(next.run(request).await),
        _ => {
            tracing::warn!("Rejected control request with missing or invalid API key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
