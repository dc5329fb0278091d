//! Axum router construction.
//!
//! Assembles the `WebSocket` endpoint and the REST push/lookup routes into
//! a single [`Router`] with CORS enabled, since the development client is
//! usually served from a different origin.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete router.
///
/// The router includes:
/// - `GET /ws` -- `WebSocket` result stream
/// - `GET /api/status` -- hub counters
/// - `GET|POST /api/results/page` -- look up / publish a page result
/// - `POST /api/results/shared` -- publish a shared result
/// - `GET /api/results/shared/{id}` -- look up a shared result
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_results))
        // REST API
        .route("/api/status", get(handlers::status))
        .route(
            "/api/results/page",
            get(handlers::get_page_result).post(handlers::publish_page),
        )
        .route(
            "/api/results/shared",
            axum::routing::post(handlers::publish_shared),
        )
        .route("/api/results/shared/{id}", get(handlers::get_shared_result))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
