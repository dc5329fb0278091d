//! Error types for the distribution engine.
//!
//! None of these are fatal to the service: callers log them and serve
//! whatever results they already have.

use std::path::PathBuf;

/// Failure to turn one persisted artifact into a result value.
///
/// Each variant affects a single lookup only. Batch loads skip the
/// failing id and carry on.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// No artifact file exists at the resolved path.
    #[error("artifact {artifact_id} not found at {}", path.display())]
    ArtifactNotFound {
        /// The artifact identifier that was requested.
        artifact_id: String,
        /// The resolved file path.
        path: PathBuf,
    },

    /// The artifact exists but is not valid JSON.
    #[error("artifact {artifact_id} at {} is corrupt: {source}", path.display())]
    ArtifactCorrupt {
        /// The artifact identifier that was requested.
        artifact_id: String,
        /// The resolved file path.
        path: PathBuf,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// The artifact could not be read for a reason other than absence.
    #[error("failed to read artifact {artifact_id} at {}: {source}", path.display())]
    ArtifactIo {
        /// The artifact identifier that was requested.
        artifact_id: String,
        /// The resolved file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The identifier would resolve outside the artifact directory.
    #[error("invalid artifact id {artifact_id:?}")]
    InvalidArtifactId {
        /// The rejected identifier.
        artifact_id: String,
    },
}

/// Failure to load a metadata manifest.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The manifest file could not be read.
    #[error("failed to read metadata manifest {}: {source}", path.display())]
    Io {
        /// The manifest path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The manifest is not valid JSON of the expected shape.
    #[error("failed to parse metadata manifest: {source}")]
    Parse {
        /// The underlying parse error.
        #[from]
        source: serde_json::Error,
    },
}

/// Errors surfaced by the [`Hub`](crate::hub::Hub).
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The metadata index has no entry for this page path.
    #[error("no metadata for page {path}: query was not run and no cached result exists")]
    MetadataMissing {
        /// The page path that was looked up.
        path: String,
    },

    /// `initialize` was called on a hub that is already running.
    #[error("hub is already initialized")]
    AlreadyInitialized,

    /// The operation requires an initialized hub.
    #[error("hub is not initialized")]
    NotInitialized,
}
