//! Health route tests.
//!
//! Uses `tower::ServiceExt` to test Axum routes without a real HTTP server.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use herald_bridge::routes::create_router;
use herald_bridge::state::AppState;
use herald_common::error::Result;
use herald_common::session::{ChatSession, JoinAck};
use herald_common::types::SessionState;
use herald_notifier::DeliveryStats;

// ============================================================
// Helpers
// ============================================================

struct StaticSession(Mutex<SessionState>);

#[async_trait]
impl ChatSession for StaticSession {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn request_join(&self, _channel: &str) -> Result<JoinAck> {
        Ok(JoinAck::Member)
    }

    async fn send(&self, _target: &str, _message: &str) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> SessionState {
        *self.0.lock().unwrap()
    }
}

async fn get_health(state: SessionState, stats: Arc<DeliveryStats>) -> (StatusCode, serde_json::Value) {
    let app = create_router(AppState::new(
        Arc::new(StaticSession(Mutex::new(state))),
        stats,
    ));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

// ============================================================
// Tests
// ============================================================

#[tokio::test]
async fn test_health_ok_when_connected() {
    let stats = Arc::new(DeliveryStats::new());
    stats.record_delivered();
    stats.record_batch();

    let (status, body) = get_health(SessionState::Connected, stats).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "herald-bridge");
    assert_eq!(body["session"], "connected");
    assert_eq!(body["stats"]["delivered"], 1);
    assert_eq!(body["stats"]["batches"], 1);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_health_unavailable_when_not_connected() {
    for state in [
        SessionState::Disconnected,
        SessionState::Connecting,
        SessionState::Draining,
    ] {
        let (status, body) = get_health(state, Arc::new(DeliveryStats::new())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["session"], state.to_string());
    }
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = create_router(AppState::new(
        Arc::new(StaticSession(Mutex::new(SessionState::Connected))),
        Arc::new(DeliveryStats::new()),
    ));

    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
