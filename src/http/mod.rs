//! HTTP surface: rate limiting middleware, demo endpoints and the limits
//! admin API.

mod middleware;
mod routes;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

pub use middleware::{rate_limit, require_admin_token, resolve_client_identity, FORWARDED_FOR};

use crate::error::TollgateError;
use crate::ratelimit::RateLimiter;

/// State shared by the middleware and the handlers.
#[derive(Clone)]
pub struct AppState {
    /// The rate limiter instance
    pub limiter: Arc<RateLimiter>,
    /// Seconds advertised in `Retry-After` on rejection
    pub retry_after_secs: u64,
    /// Bearer token guarding the admin API; the API is not served without one
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, retry_after_secs: u64) -> Self {
        Self {
            limiter,
            retry_after_secs,
            admin_token: None,
        }
    }

    /// Enable the admin API behind `token`. Blank tokens leave it disabled.
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token
            .filter(|token| !token.trim().is_empty())
            .map(Arc::from);
        self
    }

    /// Whether the admin API will be mounted.
    pub fn admin_enabled(&self) -> bool {
        self.admin_token.is_some()
    }
}

/// Build the service router. Every route, including unknown paths, passes
/// through the rate limiting middleware.
///
/// The admin API is mounted only when an admin token is configured, and
/// every admin request must present it as a bearer token.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/hello", get(routes::hello))
        .route("/api/fast", get(routes::fast))
        .route("/api/slow", get(routes::slow));

    if state.admin_enabled() {
        app = app.route(
            "/admin/limits",
            get(routes::get_limits)
                .put(routes::put_limits)
                .route_layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::require_admin_token,
                )),
        );
    }

    app.fallback(routes::not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .with_state(state)
}

impl IntoResponse for TollgateError {
    fn into_response(self) -> Response {
        let status = match self {
            TollgateError::Config(_) | TollgateError::InvalidArgument(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TollgateError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
