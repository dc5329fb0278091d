//! The distribution context: one per running service.
//!
//! [`Hub`] owns the result store, the subscription registry, the
//! broadcaster and the table of in-flight artifact loads. All of it sits
//! behind a single [`tokio::sync::Mutex`], so every mutation is applied
//! atomically with respect to other connections' events. Artifact reads
//! run on spawned tasks with the lock released.
//!
//! # Lifecycle
//!
//! 1. [`Hub::new`] with a metadata index and a delivery mode.
//! 2. [`Hub::initialize`] installs the artifact loader, merges persisted
//!    shared results and returns a [`TransportHandle`].
//! 3. Clients connect through the handle; the pipeline publishes results.
//! 4. [`Hub::shutdown`] closes every connection and returns the hub to
//!    the uninitialized state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::broadcast::Broadcaster;
use crate::error::HubError;
use crate::loader::ArtifactLoader;
use crate::metadata::MetadataIndex;
use crate::protocol::{ConnectionId, ResultEntry, ServerMessage};
use crate::registry::SubscriptionRegistry;
use crate::session::Session;
use crate::store::ResultStore;

/// Who receives a freshly published page result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Every connection, regardless of the path it is viewing. Clients
    /// filter by id.
    #[default]
    Broadcast,
    /// Only connections registered on the result's path.
    Room,
}

/// Point-in-time counters for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    /// Whether the hub is accepting connections.
    pub initialized: bool,
    /// Page result delivery policy.
    pub delivery: DeliveryMode,
    /// Live connections.
    pub connections: usize,
    /// Paths with at least one registered connection.
    pub active_paths: Vec<String>,
    /// Registered connection count per active path.
    pub rooms: BTreeMap<String, usize>,
    /// Stored page results.
    pub page_results: usize,
    /// Stored shared results.
    pub shared_results: usize,
    /// Page artifact reads currently in flight.
    pub pending_loads: usize,
    /// Artifact reads attempted since the hub was created.
    pub artifact_reads: u64,
    /// Messages handed to connection channels.
    pub messages_delivered: u64,
}

/// Mutable state guarded by the hub lock.
#[derive(Debug, Default)]
struct HubState {
    loader: Option<ArtifactLoader>,
    store: ResultStore,
    registry: SubscriptionRegistry,
    broadcaster: Broadcaster,
    /// Page path -> connections waiting on its artifact read.
    pending: HashMap<String, Vec<ConnectionId>>,
}

struct HubInner {
    metadata: Arc<dyn MetadataIndex>,
    delivery: DeliveryMode,
    initialized: AtomicBool,
    artifact_reads: Arc<AtomicU64>,
    state: Mutex<HubState>,
}

/// Shared handle to the distribution context. Cloning is cheap.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("delivery", &self.inner.delivery)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// Capability to accept client connections, available once the hub is
/// initialized.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    hub: Hub,
}

impl TransportHandle {
    /// Open a new client connection.
    ///
    /// The new connection immediately receives a replay of every stored
    /// shared result followed by every stored page result. Nobody else
    /// sees the replay.
    pub async fn connect(&self) -> Result<Session, HubError> {
        self.hub.connect().await
    }

    /// The hub this handle belongs to.
    pub const fn hub(&self) -> &Hub {
        &self.hub
    }
}

impl Hub {
    /// Create an uninitialized hub.
    pub fn new(metadata: Arc<dyn MetadataIndex>, delivery: DeliveryMode) -> Self {
        Self {
            inner: Arc::new(HubInner {
                metadata,
                delivery,
                initialized: AtomicBool::new(false),
                artifact_reads: Arc::new(AtomicU64::new(0)),
                state: Mutex::new(HubState::default()),
            }),
        }
    }

    /// Wire the artifact directory and merge persisted shared results.
    ///
    /// Shared results already published fresh are kept; only ids missing
    /// from the store are read from disk. Missing or corrupt artifacts
    /// are logged and skipped.
    pub async fn initialize(
        &self,
        project_root: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<TransportHandle, HubError> {
        let already_have = {
            let state = self.inner.state.lock().await;
            if state.loader.is_some() {
                return Err(HubError::AlreadyInitialized);
            }
            state.store.shared_ids()
        };

        let loader = ArtifactLoader::new(project_root, output_dir)
            .with_read_counter(Arc::clone(&self.inner.artifact_reads));

        // Reads run unlocked; results published meanwhile win the merge.
        let loaded = loader
            .load_missing_shared_results(&already_have, self.inner.metadata.as_ref())
            .await;

        let mut state = self.inner.state.lock().await;
        if state.loader.is_some() {
            return Err(HubError::AlreadyInitialized);
        }
        let merged = state.store.merge_shared(loaded.into_values());

        info!(
            artifact_dir = %loader.artifact_dir().display(),
            merged,
            shared_results = state.store.shared_count(),
            "hub initialized"
        );

        state.loader = Some(loader);
        self.inner.initialized.store(true, Ordering::Release);
        drop(state);

        Ok(TransportHandle { hub: self.clone() })
    }

    /// The transport handle, or `None` before initialization and after
    /// shutdown.
    pub fn transport(&self) -> Option<TransportHandle> {
        self.is_initialized()
            .then(|| TransportHandle { hub: self.clone() })
    }

    /// Whether the hub is accepting connections.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Page result delivery policy.
    pub fn delivery(&self) -> DeliveryMode {
        self.inner.delivery
    }

    /// Close every connection and return to the uninitialized state.
    ///
    /// Stored results survive, so a later `initialize` replays them.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        let connections = state.broadcaster.len();
        state.broadcaster.clear();
        state.registry.clear();
        state.pending.clear();
        state.loader = None;
        self.inner.initialized.store(false, Ordering::Release);
        info!(connections, "hub shut down");
    }

    /// Store a freshly computed page result and deliver it.
    ///
    /// Connections waiting on an in-flight artifact read for the same
    /// path are answered here, once; the read's outcome is then dropped.
    ///
    /// Returns the number of connections reached. Before initialization
    /// the result is only stored.
    pub async fn publish_page_result(&self, entry: ResultEntry) -> usize {
        let mut state = self.inner.state.lock().await;
        let path = entry.id.clone();
        state.store.set_page(entry.clone());
        let waiters = state.pending.remove(&path).unwrap_or_default();

        if !self.is_initialized() {
            debug!(path, "page result stored, hub not initialized");
            return 0;
        }

        let message = ServerMessage::PageQueryResult(entry);
        let reached = match self.inner.delivery {
            // Waiters are live connections, so send_all covers them.
            DeliveryMode::Broadcast => state.broadcaster.send_all(&message),
            DeliveryMode::Room => {
                let recipients: BTreeSet<_> = state
                    .registry
                    .members(&path)
                    .into_iter()
                    .chain(waiters)
                    .collect();
                state.broadcaster.send_to_many(recipients, &message)
            }
        };
        debug!(path, reached, "page result published");
        reached
    }

    /// Store a freshly computed shared result and deliver it to everyone.
    ///
    /// Returns the number of connections reached.
    pub async fn publish_shared_result(&self, entry: ResultEntry) -> usize {
        let mut state = self.inner.state.lock().await;
        let id = entry.id.clone();
        state.store.set_shared(entry.clone());

        if !self.is_initialized() {
            debug!(id, "shared result stored, hub not initialized");
            return 0;
        }

        let reached = state
            .broadcaster
            .send_all(&ServerMessage::StaticQueryResult(entry));
        debug!(id, reached, "shared result published");
        reached
    }

    /// Current page result for `path`.
    pub async fn page_result(&self, path: &str) -> Option<ResultEntry> {
        self.inner.state.lock().await.store.page(path).cloned()
    }

    /// Current shared result for `id`.
    pub async fn shared_result(&self, id: &str) -> Option<ResultEntry> {
        self.inner.state.lock().await.store.shared(id).cloned()
    }

    /// Paths with at least one registered connection, sorted.
    pub async fn active_paths(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        state.registry.active_paths().cloned().collect()
    }

    /// Snapshot of the hub counters.
    pub async fn stats(&self) -> HubStats {
        let state = self.inner.state.lock().await;
        HubStats {
            initialized: self.is_initialized(),
            delivery: self.inner.delivery,
            connections: state.broadcaster.len(),
            active_paths: state.registry.active_paths().cloned().collect(),
            rooms: state.registry.room_sizes(),
            page_results: state.store.page_count(),
            shared_results: state.store.shared_count(),
            pending_loads: state.pending.len(),
            artifact_reads: self.inner.artifact_reads.load(Ordering::Relaxed),
            messages_delivered: state.broadcaster.delivered(),
        }
    }

    /// Artifact id for a page, or [`HubError::MetadataMissing`].
    fn resolve_page_artifact(&self, path: &str) -> Result<String, HubError> {
        self.inner
            .metadata
            .page_artifact(path)
            .ok_or_else(|| HubError::MetadataMissing {
                path: path.to_owned(),
            })
    }

    pub(crate) async fn connect(&self) -> Result<Session, HubError> {
        let mut state = self.inner.state.lock().await;
        if !self.is_initialized() {
            return Err(HubError::NotInitialized);
        }

        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        state.broadcaster.insert(id, tx);

        let replay: Vec<_> = state
            .store
            .shared_entries()
            .cloned()
            .map(ServerMessage::StaticQueryResult)
            .chain(
                state
                    .store
                    .page_entries()
                    .cloned()
                    .map(ServerMessage::PageQueryResult),
            )
            .collect();
        let replayed = replay.len();
        for message in replay {
            state.broadcaster.send_to(id, message);
        }

        info!(connection = %id, replayed, "client connected");
        drop(state);
        Ok(Session::new(id, self.clone(), rx))
    }

    /// Join the room for `path` and answer with its page result, loading
    /// the artifact if nothing is stored yet.
    pub(crate) async fn register_path(&self, connection: ConnectionId, path: &str) {
        let mut state = self.inner.state.lock().await;
        if !state.broadcaster.contains(connection) {
            debug!(%connection, path, "register from closed connection ignored");
            return;
        }

        if state.registry.join(connection, path) {
            debug!(%connection, path, "joined room");
        }

        if let Some(entry) = state.store.page(path).cloned() {
            state
                .broadcaster
                .send_to(connection, ServerMessage::PageQueryResult(entry));
            return;
        }

        let artifact_id = match self.resolve_page_artifact(path) {
            Ok(artifact_id) => artifact_id,
            Err(e) => {
                error!(%connection, error = %e, "answering with empty page result");
                state.broadcaster.send_to(
                    connection,
                    ServerMessage::PageQueryResult(ResultEntry::empty(path)),
                );
                return;
            }
        };

        let Some(loader) = state.loader.clone() else {
            warn!(%connection, path, "hub not initialized, cannot load artifact");
            state.broadcaster.send_to(
                connection,
                ServerMessage::PageQueryResult(ResultEntry::empty(path)),
            );
            return;
        };

        match state.pending.entry(path.to_owned()) {
            Entry::Occupied(mut waiters) => {
                debug!(%connection, path, "artifact read already in flight");
                waiters.get_mut().push(connection);
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(vec![connection]);
            }
        }
        drop(state);

        let hub = self.clone();
        let path = path.to_owned();
        tokio::spawn(async move {
            hub.complete_page_load(path, artifact_id, loader).await;
        });
    }

    /// Read a page artifact and answer every connection waiting on it.
    async fn complete_page_load(&self, path: String, artifact_id: String, loader: ArtifactLoader) {
        let outcome = loader.load(&artifact_id).await;

        let mut state = self.inner.state.lock().await;
        let waiters = state.pending.remove(&path).unwrap_or_default();

        let entry = match (state.store.page(&path).cloned(), outcome) {
            // A fresh push landed while the read was in flight. It already
            // answered the waiters and took them out of `pending`.
            (Some(fresh), _) => fresh,
            (None, Ok(value)) => {
                let entry = ResultEntry::new(path.as_str(), value);
                state.store.set_page(entry.clone());
                debug!(path, artifact_id, "page result loaded from artifact");
                entry
            }
            (None, Err(e)) => {
                error!(path, error = %e, "failed to load page result");
                ResultEntry::empty(path.as_str())
            }
        };

        let message = ServerMessage::PageQueryResult(entry);
        let reached = state.broadcaster.send_to_many(waiters, &message);
        debug!(path, reached, "page result answered");
    }

    /// Leave the room for `path`.
    pub(crate) async fn unregister_path(&self, connection: ConnectionId, path: &str) {
        let mut state = self.inner.state.lock().await;
        if state.registry.leave(connection, path) {
            debug!(%connection, path, "path no longer active");
        }
    }

    /// Forget a connection and leave every room it joined.
    pub(crate) async fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.inner.state.lock().await;
        state.broadcaster.remove(connection);
        let active_path = state
            .registry
            .connection(connection)
            .and_then(|rooms| rooms.active_path.clone());
        let deactivated = state.registry.disconnect(connection);
        for waiters in state.pending.values_mut() {
            waiters.retain(|waiter| *waiter != connection);
        }
        info!(
            %connection,
            active_path = active_path.as_deref().unwrap_or("-"),
            deactivated = deactivated.len(),
            "client disconnected"
        );
    }
}
