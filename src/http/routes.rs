//! Demo endpoints and the limits admin API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use super::AppState;
use crate::error::TollgateError;
use crate::ratelimit::LimitsConfig;

pub async fn hello() -> &'static str {
    "Hello, world!"
}

pub async fn fast() -> &'static str {
    "Fast endpoint: higher rate"
}

pub async fn slow() -> &'static str {
    "Slow endpoint: lower rate"
}

pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Return the active limit table.
pub async fn get_limits(State(state): State<AppState>) -> Json<LimitsConfig> {
    Json(state.limiter.limits().to_config())
}

/// Replace the limit table wholesale.
pub async fn put_limits(
    State(state): State<AppState>,
    Json(config): Json<LimitsConfig>,
) -> Result<Json<LimitsConfig>, TollgateError> {
    let endpoints = config.endpoints.len();
    state.limiter.reload_limits(config)?;
    info!(endpoints = endpoints, "Endpoint limits replaced through admin API");

    Ok(Json(state.limiter.limits().to_config()))
}
