//! Health check endpoint.
//!
//! Healthy means the IRC session is registered. Delivery counters are
//! included so a probe can tell a stalled consumer from an idle one.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use herald_common::types::SessionState;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let session = state.session.state();
    let (code, status) = match session {
        SessionState::Connected => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": "herald-bridge",
            "version": env!("CARGO_PKG_VERSION"),
            "session": session,
            "stats": state.stats.snapshot(),
        })),
    )
}
