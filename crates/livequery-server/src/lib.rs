//! Transport and process glue for the livequery distribution engine.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) carrying page and shared query
//!   results to development clients, and `registerPath` /
//!   `unregisterPath` events back to the hub
//! - **Push endpoints** (`POST /api/results/*`) the build pipeline uses to
//!   publish freshly computed results
//! - **Lookup and status endpoints** for tooling and debugging
//!
//! All engine state lives in the [`Hub`](livequery_core::Hub); this crate
//! only moves messages between sockets and the hub.

pub mod config;
pub mod error;
pub mod handlers;
pub mod manifest;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use config::{ConfigError, LivequeryConfig};
pub use manifest::ManifestWatcher;
pub use router::build_router;
pub use server::{ServerError, serve, start_server};
pub use state::AppState;
