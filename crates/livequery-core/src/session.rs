//! Per-connection protocol handling.
//!
//! A [`Session`] is what a transport holds for one client: it feeds
//! client events into the hub and drains the connection's outbound
//! channel. The state machine is
//!
//! ```text
//! Connected --registerPath(p)--> Registered(p) --unregisterPath(p)--> Connected
//!     \______________________________|_____ disconnect ____________> Terminated
//! ```
//!
//! Disconnecting leaves every room the connection joined.

use tokio::sync::mpsc;
use tracing::debug;

use crate::hub::Hub;
use crate::protocol::{ClientEvent, ConnectionId, ServerMessage};

/// One live client connection.
///
/// Dropping a session without calling [`Session::disconnect`] still
/// deregisters it, on a spawned task.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    hub: Hub,
    outbound: mpsc::UnboundedReceiver<ServerMessage>,
    terminated: bool,
}

impl Session {
    pub(crate) const fn new(
        id: ConnectionId,
        hub: Hub,
        outbound: mpsc::UnboundedReceiver<ServerMessage>,
    ) -> Self {
        Self {
            id,
            hub,
            outbound,
            terminated: false,
        }
    }

    /// This connection's id.
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Dispatch one client event.
    pub async fn handle(&self, event: ClientEvent) {
        match event {
            ClientEvent::RegisterPath(path) => self.register_path(&path).await,
            ClientEvent::UnregisterPath(path) => self.unregister_path(&path).await,
        }
    }

    /// Register interest in a page path.
    ///
    /// The page result is answered on this connection, possibly after an
    /// artifact read completes in the background.
    pub async fn register_path(&self, path: &str) {
        self.hub.register_path(self.id, path).await;
    }

    /// Withdraw interest in a page path.
    pub async fn unregister_path(&self, path: &str) {
        self.hub.unregister_path(self.id, path).await;
    }

    /// Wait for the next message addressed to this connection.
    ///
    /// Returns `None` once the hub has shut down.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.outbound.recv().await
    }

    /// Take the next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.outbound.try_recv().ok()
    }

    /// Close the connection and leave all of its rooms.
    pub async fn disconnect(mut self) {
        self.terminated = true;
        self.hub.disconnect(self.id).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.terminated {
            return;
        }
        let hub = self.hub.clone();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { hub.disconnect(id).await });
            }
            Err(_) => debug!(connection = %id, "session dropped outside a runtime"),
        }
    }
}
