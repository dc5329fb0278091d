//! Read-only lookup from page paths and shared-result hashes to artifacts.
//!
//! The build pipeline owns this information. The engine only reads it,
//! through the [`MetadataIndex`] trait, so tests and embedders can supply
//! whatever backing they like. [`ManifestIndex`] is the JSON-manifest
//! implementation; [`ReloadableIndex`] wraps one so the server can swap in
//! a newer manifest while the hub keeps running.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

/// Artifact location for one page result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    /// Identifier of the persisted artifact.
    pub artifact_id: String,
}

/// Artifact location for one shared result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedMetadata {
    /// Identifier of the persisted artifact.
    pub artifact_id: String,
    /// Source file that declared the query, when known.
    #[serde(default)]
    pub source_path: Option<String>,
}

/// Lookup interface the engine consults on cache misses.
pub trait MetadataIndex: Send + Sync {
    /// Artifact id for the result of the page at `path`.
    fn page_artifact(&self, path: &str) -> Option<String>;

    /// Every shared result the pipeline knows about.
    fn shared_entries(&self) -> Vec<(String, SharedMetadata)>;
}

/// In-memory metadata index, usually deserialized from a JSON manifest.
///
/// ```json
/// {
///   "pages": {"/about": {"artifactId": "abc123"}},
///   "staticQueries": {"hash1": {"artifactId": "def456", "sourcePath": "src/seo.js"}}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestIndex {
    #[serde(default)]
    pages: BTreeMap<String, PageMetadata>,
    #[serde(default)]
    static_queries: BTreeMap<String, SharedMetadata>,
}

impl ManifestIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a manifest from raw JSON bytes.
    pub fn from_slice(json: &[u8]) -> Result<Self, MetadataError> {
        Ok(serde_json::from_slice(json)?)
    }

    /// Map a page path to an artifact id.
    pub fn insert_page(&mut self, path: impl Into<String>, artifact_id: impl Into<String>) {
        self.pages.insert(
            path.into(),
            PageMetadata {
                artifact_id: artifact_id.into(),
            },
        );
    }

    /// Map a shared-result hash to its metadata.
    pub fn insert_shared(&mut self, hash: impl Into<String>, metadata: SharedMetadata) {
        self.static_queries.insert(hash.into(), metadata);
    }

    /// Number of page entries.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of shared entries.
    pub fn shared_count(&self) -> usize {
        self.static_queries.len()
    }
}

impl MetadataIndex for ManifestIndex {
    fn page_artifact(&self, path: &str) -> Option<String> {
        self.pages.get(path).map(|page| page.artifact_id.clone())
    }

    fn shared_entries(&self) -> Vec<(String, SharedMetadata)> {
        self.static_queries
            .iter()
            .map(|(hash, meta)| (hash.clone(), meta.clone()))
            .collect()
    }
}

/// A [`ManifestIndex`] that can be replaced in place.
///
/// Lookups take a short read lock; [`replace`](Self::replace) swaps the
/// whole manifest at once, so a lookup never sees half of an update.
#[derive(Debug, Default)]
pub struct ReloadableIndex {
    current: RwLock<ManifestIndex>,
}

impl ReloadableIndex {
    /// Wrap an initial manifest.
    pub const fn new(manifest: ManifestIndex) -> Self {
        Self {
            current: RwLock::new(manifest),
        }
    }

    /// Swap in a new manifest, returning the previous one.
    pub fn replace(&self, manifest: ManifestIndex) -> ManifestIndex {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, manifest)
    }

    /// A copy of the current manifest.
    pub fn snapshot(&self) -> ManifestIndex {
        self.read().clone()
    }

    // A writer that panicked mid-swap still leaves a whole manifest behind.
    fn read(&self) -> RwLockReadGuard<'_, ManifestIndex> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetadataIndex for ReloadableIndex {
    fn page_artifact(&self, path: &str) -> Option<String> {
        self.read().page_artifact(path)
    }

    fn shared_entries(&self) -> Vec<(String, SharedMetadata)> {
        self.read().shared_entries()
    }
}
