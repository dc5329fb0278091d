//! Wire types exchanged with development clients.
//!
//! Server messages and client events are adjacently tagged JSON objects:
//!
//! ```json
//! {"type": "pageQueryResult", "payload": {"id": "/about", "result": {"data": {}}}}
//! {"type": "registerPath", "payload": "/about"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One computed query result.
///
/// `id` is either a page path (page results) or a content hash (shared
/// results). An absent result is represented by [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Page path or shared-result hash.
    pub id: String,
    /// The raw result value as produced by the pipeline.
    #[serde(default)]
    pub result: Value,
}

impl ResultEntry {
    /// Create an entry from an id and a result value.
    pub fn new(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result,
        }
    }

    /// Create an entry with no result, used when nothing could be loaded.
    pub fn empty(id: impl Into<String>) -> Self {
        Self::new(id, Value::Null)
    }
}

/// Messages pushed from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    /// A result bound to a single page path.
    PageQueryResult(ResultEntry),
    /// A result shared across pages, keyed by hash.
    StaticQueryResult(ResultEntry),
}

impl ServerMessage {
    /// The entry carried by this message.
    pub const fn entry(&self) -> &ResultEntry {
        match self {
            Self::PageQueryResult(entry) | Self::StaticQueryResult(entry) => entry,
        }
    }
}

/// Events sent by a client over its channel.
///
/// Disconnect is not an event: it is implied by the channel closing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientEvent {
    /// The client is now viewing this page path.
    RegisterPath(String),
    /// The client stopped viewing this page path.
    UnregisterPath(String),
}

/// Identifier of one live client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh random connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
