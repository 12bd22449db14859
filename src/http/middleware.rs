//! Admission middleware.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::AppState;

/// Header carrying the originating client address behind proxies.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Derive the client identity for a request.
///
/// Uses the first entry of `X-Forwarded-For` when present and non-empty,
/// otherwise the peer IP address.
pub fn resolve_client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|client| !client.is_empty());

    match forwarded {
        Some(client) => Some(client.to_string()),
        None => peer.map(|addr| addr.ip().to_string()),
    }
}

/// Charge one token per request against `(client, endpoint)` and reject
/// with `429 Too Many Requests` when the bucket is empty.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let Some(client) = resolve_client_identity(request.headers(), peer) else {
        warn!(path = %request.uri().path(), "Rejecting request without client identity");
        return (StatusCode::BAD_REQUEST, "Unable to determine client identity").into_response();
    };

    let path = request.uri().path().to_string();
    if state.limiter.allow(&client, &path) {
        return next.run(request).await;
    }

    debug!(client = %client, path = %path, "Request rejected by rate limiter");
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, state.retry_after_secs.to_string())],
        format!("Too Many Requests - Rate limit exceeded for endpoint: {}", path),
    )
        .into_response()
}

/// Reject admin requests that do not carry the configured bearer token.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    let authorized = match (state.admin_token.as_deref(), presented) {
        (Some(expected), Some(presented)) => tokens_match(expected, presented),
        _ => false,
    };

    if authorized {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Rejecting unauthenticated admin request");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        "Unauthorized",
    )
        .into_response()
}

/// Compare tokens without short-circuiting on the first differing byte.
fn tokens_match(expected: &str, presented: &str) -> bool {
    let (expected, presented) = (expected.as_bytes(), presented.as_bytes());
    expected.len() == presented.len()
        && expected
            .iter()
            .zip(presented)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}
