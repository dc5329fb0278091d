//! Path-scoped subscription rooms.
//!
//! Every page path has a room, named [`room_name`]. A connection joins a
//! room when it registers the path and leaves it when it unregisters or
//! disconnects. A path is *active* exactly while its room has at least
//! one member.
//!
//! Connections may hold several rooms at once (re-registering without
//! unregistering first). The registry tracks the full set per
//! connection, so a disconnect leaves every room the connection joined,
//! not just the most recent one.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::protocol::ConnectionId;

/// Room key for a page path.
pub fn room_name(path: &str) -> String {
    format!("path-{path}")
}

/// Per-connection subscription state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRooms {
    /// The path most recently registered, while still joined.
    pub active_path: Option<String>,
    /// Every path whose room this connection is in.
    pub paths: BTreeSet<String>,
}

/// Room membership plus the derived set of active paths.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    rooms: HashMap<String, BTreeSet<ConnectionId>>,
    connections: HashMap<ConnectionId, ConnectionRooms>,
    active_paths: BTreeSet<String>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to the room for `path` and mark it active.
    ///
    /// Idempotent. Returns `true` if the connection was not already in
    /// the room.
    pub fn join(&mut self, connection: ConnectionId, path: &str) -> bool {
        let joined = self
            .rooms
            .entry(room_name(path))
            .or_default()
            .insert(connection);
        self.active_paths.insert(path.to_owned());

        let rooms = self.connections.entry(connection).or_default();
        rooms.paths.insert(path.to_owned());
        rooms.active_path = Some(path.to_owned());
        joined
    }

    /// Remove `connection` from the room for `path`.
    ///
    /// Returns `true` if the room is now empty and `path` stopped being
    /// active.
    pub fn leave(&mut self, connection: ConnectionId, path: &str) -> bool {
        if let Some(rooms) = self.connections.get_mut(&connection) {
            rooms.paths.remove(path);
            if rooms.active_path.as_deref() == Some(path) {
                rooms.active_path = None;
            }
        }

        let room = room_name(path);
        let empty = self.rooms.get_mut(&room).is_none_or(|members| {
            members.remove(&connection);
            members.is_empty()
        });

        if empty {
            self.rooms.remove(&room);
            return self.active_paths.remove(path);
        }
        false
    }

    /// Leave every room `connection` is in and forget the connection.
    ///
    /// Returns the paths that stopped being active.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<String> {
        let Some(rooms) = self.connections.remove(&connection) else {
            return Vec::new();
        };
        rooms
            .paths
            .into_iter()
            .filter(|path| self.leave(connection, path))
            .collect()
    }

    /// Connections currently in the room for `path`.
    pub fn members(&self, path: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(&room_name(path))
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All active paths, sorted.
    pub fn active_paths(&self) -> impl Iterator<Item = &String> {
        self.active_paths.iter()
    }

    /// Subscription state of one connection.
    pub fn connection(&self, connection: ConnectionId) -> Option<&ConnectionRooms> {
        self.connections.get(&connection)
    }

    /// Member count per active path.
    pub fn room_sizes(&self) -> BTreeMap<String, usize> {
        self.active_paths
            .iter()
            .map(|path| (path.clone(), self.members(path).len()))
            .collect()
    }

    /// Drop all rooms and connections.
    pub fn clear(&mut self) {
        self.rooms.clear();
        self.connections.clear();
        self.active_paths.clear();
    }
}
