//! Bearer token gate for every API route

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::http::AppState;
use crate::error::{Error, Result};

/// Validate an `Authorization` header against the configured token.
/// The header must be exactly `Bearer <token>`.
pub fn check_bearer(header: Option<&HeaderValue>, expected: &str) -> Result<()> {
    let value = match header {
        Some(h) if !h.is_empty() => h,
        _ => return Err(Error::AuthRejected("Authorization header is required")),
    };

    let value = value
        .to_str()
        .map_err(|_| Error::AuthRejected("Invalid authorization header format"))?;

    let parts: Vec<&str> = value.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Bearer" {
        return Err(Error::AuthRejected("Invalid authorization header format"));
    }

    if parts[1] != expected {
        return Err(Error::AuthRejected("Invalid bearer token"));
    }

    Ok(())
}

/// Middleware rejecting requests without the configured bearer token
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match check_bearer(request.headers().get(AUTHORIZATION), &state.token) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!("Rejected {} {}: {}", request.method(), request.uri().path(), e);
            e.into_response()
        }
    }
}
