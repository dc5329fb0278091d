//! Live result distribution engine.
//!
//! An external build pipeline computes query results (bound to a single
//! page, or shared across pages and keyed by a content hash) and persists
//! them as JSON artifacts. This crate keeps an in-memory index of those
//! results and pushes them to connected development clients.
//!
//! # Architecture
//!
//! ```text
//! pipeline --publish--> Hub --+--> ResultStore
//!                             +--> Broadcaster --> Session (one per client)
//! client --registerPath--> Session --> SubscriptionRegistry (rooms)
//!                                  \-> ArtifactLoader (cache miss, off-lock)
//! ```
//!
//! The [`Hub`] is an explicitly constructed context object. All of its
//! mutable state sits behind a single lock; artifact reads run on spawned
//! tasks so a slow or missing artifact never stalls other connections.

pub mod broadcast;
pub mod error;
pub mod hub;
pub mod loader;
pub mod metadata;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod store;

// Re-export primary types for convenience.
pub use error::{HubError, LoadError, MetadataError};
pub use hub::{DeliveryMode, Hub, HubStats, TransportHandle};
pub use loader::{ArtifactLoader, DEFAULT_OUTPUT_DIR};
pub use metadata::{
    ManifestIndex, MetadataIndex, PageMetadata, ReloadableIndex, SharedMetadata,
};
pub use protocol::{ClientEvent, ConnectionId, ResultEntry, ServerMessage};
pub use session::Session;
