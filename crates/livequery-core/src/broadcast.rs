//! Delivery of server messages to connections.
//!
//! Each connection owns the receiving half of an unbounded channel; the
//! broadcaster holds the sending halves. Sends are fire-and-forget: a
//! closed channel means the connection is going away, and its session
//! will deregister it, so failures are logged and otherwise ignored.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::{ConnectionId, ServerMessage};

/// Sending half of one connection's outbound channel.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Send-to-all and send-to-one over the set of live connections.
#[derive(Debug, Default)]
pub struct Broadcaster {
    connections: HashMap<ConnectionId, Outbound>,
    delivered: u64,
}

impl Broadcaster {
    /// Create a broadcaster with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering to `connection`.
    pub fn insert(&mut self, connection: ConnectionId, outbound: Outbound) {
        self.connections.insert(connection, outbound);
    }

    /// Stop delivering to `connection`. Returns whether it was present.
    pub fn remove(&mut self, connection: ConnectionId) -> bool {
        self.connections.remove(&connection).is_some()
    }

    /// Whether `connection` is live.
    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether there are no live connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Total messages handed to connection channels.
    pub const fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Deliver to exactly one connection.
    ///
    /// Returns `false` if the connection is unknown or its channel is
    /// closed.
    pub fn send_to(&mut self, connection: ConnectionId, message: ServerMessage) -> bool {
        let Some(outbound) = self.connections.get(&connection) else {
            debug!(%connection, "dropping message for unknown connection");
            return false;
        };
        if outbound.send(message).is_err() {
            debug!(%connection, "connection channel closed, message dropped");
            return false;
        }
        self.delivered = self.delivered.saturating_add(1);
        true
    }

    /// Deliver to every live connection. Returns the number reached.
    pub fn send_all(&mut self, message: &ServerMessage) -> usize {
        let ids: Vec<_> = self.connections.keys().copied().collect();
        self.send_to_many(ids, message)
    }

    /// Deliver to each of `connections`. Returns the number reached.
    pub fn send_to_many(
        &mut self,
        connections: impl IntoIterator<Item = ConnectionId>,
        message: &ServerMessage,
    ) -> usize {
        connections
            .into_iter()
            .filter(|connection| self.send_to(*connection, message.clone()))
            .count()
    }

    /// Drop every connection's sender, closing their channels.
    pub fn clear(&mut self) {
        self.connections.clear();
    }
}
