//! livequery server binary.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`livequery.yaml` or the path in the first
//!    argument; defaults when absent)
//! 2. Initialize structured logging (tracing)
//! 3. Load the pipeline's metadata manifest and start watching it
//! 4. Create and initialize the hub (merges persisted shared results)
//! 5. Serve HTTP + `WebSocket` until Ctrl-C, then shut the hub down

use std::path::PathBuf;
use std::sync::Arc;

use livequery_core::{Hub, ReloadableIndex};
use livequery_server::config::LoggingConfig;
use livequery_server::{AppState, LivequeryConfig, ManifestWatcher, start_server};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, hub initialization or the server
/// fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from("livequery.yaml"), PathBuf::from);
    let config = LivequeryConfig::load_or_default(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        config = %config_path.display(),
        host = config.server.host,
        port = config.server.port,
        project_root = %config.project.root.display(),
        delivery = ?config.delivery.page_results,
        "livequery-server starting"
    );

    // 3. Load the metadata manifest.
    let index = Arc::new(ReloadableIndex::default());
    let watcher = load_manifest(&config, &index).await;

    // 4. Create and initialize the hub.
    let hub = Hub::new(index, config.delivery.page_results);
    hub.initialize(&config.project.root, &config.project.output_dir)
        .await?;

    // 5. Serve until Ctrl-C.
    let state = Arc::new(AppState::new(hub.clone()));
    let shutdown_hub = hub.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
        shutdown_hub.shutdown().await;
    };

    start_server(&config.server, state, shutdown).await?;
    if let Some(watcher) = watcher {
        watcher.abort();
    }

    info!("livequery-server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Read the manifest named in the config into `index` and, unless
/// reloading is disabled, keep watching it. A missing or unreadable
/// manifest leaves the index empty: every page registration then answers
/// with an empty result until results are pushed or the file appears.
async fn load_manifest(
    config: &LivequeryConfig,
    index: &Arc<ReloadableIndex>,
) -> Option<JoinHandle<()>> {
    let Some(path) = config.project.manifest_path() else {
        warn!("no metadata manifest configured, starting with an empty index");
        return None;
    };
    let mut watcher = ManifestWatcher::new(path.clone(), Arc::clone(index));
    if let Err(e) = watcher.poll().await {
        warn!(path = %path.display(), error = %e, "metadata manifest unavailable, starting with an empty index");
    }
    let interval = config.project.manifest_poll_interval()?;
    info!(path = %path.display(), ?interval, "watching metadata manifest");
    Some(watcher.spawn(interval))
}
