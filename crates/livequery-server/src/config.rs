//! Configuration loading for the livequery server.
//!
//! The configuration lives in `livequery.yaml` next to the process (or at
//! the path given as the first CLI argument). Every field has a default,
//! so an empty or missing file yields a working development setup.
//!
//! ```yaml
//! server:
//!   host: "127.0.0.1"
//!   port: 8000
//! project:
//!   root: "."
//!   output_dir: "public/static/d"
//!   manifest: ".cache/livequery-manifest.json"
//!   manifest_poll_ms: 1000   # 0 reads the manifest once
//! delivery:
//!   page_results: broadcast   # or: room
//! logging:
//!   level: info
//!   json: false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use livequery_core::{DEFAULT_OUTPUT_DIR, DeliveryMode};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        #[from]
        source: serde_yml::Error,
    },

    /// An environment override held an unusable value.
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidEnv {
        /// The environment variable name.
        name: &'static str,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LivequeryConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Where the pipeline writes artifacts and metadata.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Delivery policy.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LivequeryConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides:
    /// - `LIVEQUERY_HOST` overrides `server.host`
    /// - `LIVEQUERY_PORT` overrides `server.port`
    /// - `LIVEQUERY_PROJECT_ROOT` overrides `project.root`
    /// - `LIVEQUERY_MANIFEST` overrides `project.manifest`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    /// Environment overrides apply either way.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("LIVEQUERY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("LIVEQUERY_PORT") {
            self.server.port = port.parse().map_err(|e| ConfigError::InvalidEnv {
                name: "LIVEQUERY_PORT",
                value: port.clone(),
                reason: format!("{e}"),
            })?;
        }
        if let Some(root) = lookup("LIVEQUERY_PROJECT_ROOT") {
            self.project.root = PathBuf::from(root);
        }
        if let Some(manifest) = lookup("LIVEQUERY_MANIFEST") {
            self.project.manifest = Some(PathBuf::from(manifest));
        }
        Ok(())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// The host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// The TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Project layout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectConfig {
    /// Project root directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Artifact directory, relative to `root`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Metadata manifest written by the pipeline, relative to `root`.
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    /// How often to re-read the manifest, in milliseconds. Zero disables
    /// reloading.
    #[serde(default = "default_manifest_poll_ms")]
    pub manifest_poll_ms: u64,
}

impl ProjectConfig {
    /// Resolved manifest path, if one is configured.
    pub fn manifest_path(&self) -> Option<PathBuf> {
        self.manifest.as_ref().map(|manifest| self.root.join(manifest))
    }

    /// Manifest reload interval, or `None` when reloading is disabled.
    pub fn manifest_poll_interval(&self) -> Option<Duration> {
        (self.manifest_poll_ms > 0).then(|| Duration::from_millis(self.manifest_poll_ms))
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            output_dir: default_output_dir(),
            manifest: None,
            manifest_poll_ms: default_manifest_poll_ms(),
        }
    }
}

/// Delivery policy configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DeliveryConfig {
    /// Who receives published page results.
    #[serde(default)]
    pub page_results: DeliveryMode,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_host() -> String {
    String::from("127.0.0.1")
}

const fn default_port() -> u16 {
    8000
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

const fn default_manifest_poll_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    String::from("info")
}
