//! Reads persisted result artifacts from the project's output directory.
//!
//! An artifact lives at `<project root>/<output dir>/<artifact id>.json`
//! and contains the raw result value, not wrapped in a message envelope.
//! Reads go through [`tokio::fs`] so a cache miss never blocks the
//! runtime thread that serves other connections.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::metadata::MetadataIndex;
use crate::protocol::ResultEntry;

/// Output directory, relative to the project root, holding artifacts.
pub const DEFAULT_OUTPUT_DIR: &str = "public/static/d";

/// Resolves artifact ids to files and parses them.
///
/// Cloning is cheap; clones share the read counter.
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    artifact_dir: PathBuf,
    reads: Arc<AtomicU64>,
}

impl ArtifactLoader {
    /// Create a loader for `project_root` with artifacts under `output_dir`.
    pub fn new(project_root: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Self {
        Self {
            artifact_dir: project_root.as_ref().join(output_dir),
            reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Count reads into an externally owned counter.
    #[must_use]
    pub fn with_read_counter(mut self, reads: Arc<AtomicU64>) -> Self {
        self.reads = reads;
        self
    }

    /// Directory the artifacts are read from.
    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Number of artifact reads attempted so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Deterministic file path for an artifact id.
    pub fn artifact_path(&self, artifact_id: &str) -> PathBuf {
        self.artifact_dir.join(format!("{artifact_id}.json"))
    }

    /// Read and parse one artifact.
    pub async fn load(&self, artifact_id: &str) -> Result<Value, LoadError> {
        if !is_valid_artifact_id(artifact_id) {
            return Err(LoadError::InvalidArtifactId {
                artifact_id: artifact_id.to_owned(),
            });
        }

        let path = self.artifact_path(artifact_id);
        self.reads.fetch_add(1, Ordering::Relaxed);

        let bytes = tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                LoadError::ArtifactNotFound {
                    artifact_id: artifact_id.to_owned(),
                    path: path.clone(),
                }
            } else {
                LoadError::ArtifactIo {
                    artifact_id: artifact_id.to_owned(),
                    path: path.clone(),
                    source,
                }
            }
        })?;

        let value = serde_json::from_slice(&bytes).map_err(|source| LoadError::ArtifactCorrupt {
            artifact_id: artifact_id.to_owned(),
            path: path.clone(),
            source,
        })?;

        debug!(artifact_id, path = %path.display(), "artifact loaded");
        Ok(value)
    }

    /// Load every shared result the metadata index knows but `already_have`
    /// does not contain.
    ///
    /// Reads run concurrently. Failures are logged and the id is skipped:
    /// a shared query that never ran materializes only once a fresh result
    /// is pushed.
    pub async fn load_missing_shared_results(
        &self,
        already_have: &HashSet<String>,
        metadata: &dyn MetadataIndex,
    ) -> HashMap<String, ResultEntry> {
        let missing: Vec<_> = metadata
            .shared_entries()
            .into_iter()
            .filter(|(hash, _)| !already_have.contains(hash))
            .collect();

        let loads = missing.into_iter().map(|(hash, meta)| async move {
            let outcome = self.load(&meta.artifact_id).await;
            (hash, meta, outcome)
        });

        let mut loaded = HashMap::new();
        for (hash, meta, outcome) in join_all(loads).await {
            match outcome {
                Ok(value) => {
                    loaded.insert(hash.clone(), ResultEntry::new(hash, value));
                }
                Err(e) => {
                    warn!(
                        hash,
                        artifact_id = meta.artifact_id,
                        source_path = meta.source_path.as_deref().unwrap_or("-"),
                        error = %e,
                        "skipping shared result without a usable artifact"
                    );
                }
            }
        }
        loaded
    }
}

/// Artifact ids are plain file stems; anything that could walk out of the
/// artifact directory is rejected.
fn is_valid_artifact_id(artifact_id: &str) -> bool {
    !artifact_id.is_empty()
        && artifact_id != "."
        && artifact_id != ".."
        && !artifact_id.contains(['/', '\\', '\0'])
}
