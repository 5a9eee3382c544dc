//! Health check endpoints

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    /// Upstream market WebSocket is open. It only connects once a client
    /// subscribes, so `false` alone is not a failure.
    feed_connected: bool,
    subscribed_tokens: usize,
    active_sessions: usize,
    ai_enabled: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        feed_connected: state.feed.is_connected(),
        subscribed_tokens: state.feed.subscribed_tokens().len(),
        active_sessions: state.accounts.active_sessions(),
        ai_enabled: state.analyst.is_some(),
    })
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}
