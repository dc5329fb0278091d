//! Metadata manifest loading and reloading.
//!
//! The pipeline rewrites its manifest whenever it runs queries for new
//! pages. [`ManifestWatcher`] re-reads the file on an interval and swaps
//! the parsed result into the hub's [`ReloadableIndex`], so pages added
//! after startup resolve without a restart.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use livequery_core::{ManifestIndex, MetadataError, ReloadableIndex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Polls one manifest file and reloads the index when its bytes change.
#[derive(Debug)]
pub struct ManifestWatcher {
    path: PathBuf,
    index: Arc<ReloadableIndex>,
    last_seen: Option<Vec<u8>>,
}

impl ManifestWatcher {
    /// Watch `path`, writing parsed manifests into `index`.
    pub const fn new(path: PathBuf, index: Arc<ReloadableIndex>) -> Self {
        Self {
            path,
            index,
            last_seen: None,
        }
    }

    /// Read the manifest once.
    ///
    /// Returns `Ok(true)` when the index was replaced and `Ok(false)` when
    /// the file is unchanged since the last poll. Unparseable contents are
    /// remembered, so the same broken file is reported once.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// manifest. The index keeps its previous contents.
    pub async fn poll(&mut self) -> Result<bool, MetadataError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| MetadataError::Io {
                path: self.path.clone(),
                source,
            })?;
        if self.last_seen.as_deref() == Some(bytes.as_slice()) {
            return Ok(false);
        }

        let parsed = ManifestIndex::from_slice(&bytes);
        self.last_seen = Some(bytes);
        let manifest = parsed?;
        info!(
            path = %self.path.display(),
            pages = manifest.page_count(),
            shared = manifest.shared_count(),
            "metadata manifest loaded"
        );
        self.index.replace(manifest);
        Ok(true)
    }

    /// Poll on `interval` until the task is aborted.
    pub fn spawn(mut self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; the caller already polled.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.poll().await {
                    Ok(true) => debug!(path = %self.path.display(), "metadata manifest reloaded"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "metadata manifest reload failed, keeping previous index"),
                }
            }
        })
    }
}
