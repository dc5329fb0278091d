//! Shared application state for the Axum server.

use chrono::{DateTime, Utc};
use livequery_core::Hub;

/// State injected into every handler via Axum's `State` extractor.
///
/// Wrapped in [`Arc`](std::sync::Arc) by the router.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The distribution context.
    pub hub: Hub,
    /// When the server started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state around an existing hub.
    pub fn new(hub: Hub) -> Self {
        Self {
            hub,
            started_at: Utc::now(),
        }
    }
}
