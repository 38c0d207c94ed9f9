//! Shared state for the health server.

use std::sync::Arc;

use herald_common::session::ChatSession;
use herald_notifier::DeliveryStats;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<dyn ChatSession>,
    pub stats: Arc<DeliveryStats>,
}

impl AppState {
    pub fn new(session: Arc<dyn ChatSession>, stats: Arc<DeliveryStats>) -> Self {
        Self { session, stats }
    }
}
