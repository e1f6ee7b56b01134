//! Application orchestrator: wires the agent components together.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::sync::mpsc;

use tether_connection::{
    ClientIdentity, ConnectionEvent, ConnectionManager, InterfaceProbe,
};
use tether_endpoint::{ConfigResolver, FileStore, HttpResolver, StaticResolver, default_cache_path};
use tether_protocol::Endpoint;
use tether_uploader::{DirectorySource, Uploader};

use crate::config::Config;

/// Runs the agent until Ctrl+C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let resolver = build_resolver(&config)?;
    let store = Arc::new(FileStore::new(cache_path(&config)?));
    tracing::info!(path = %store.path().display(), "endpoint cache");

    // -- Uploader --
    let source = DirectorySource::new(&config.media_dir)
        .with_extensions(config.media_extensions.iter().cloned());
    tracing::info!(dir = %source.dir().display(), "media directory");
    let uploader = Arc::new(Uploader::new(Arc::new(source), config.uploader_config()));

    // -- Connection manager --
    let identity = ClientIdentity {
        name: config.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        client_id: config.client_id.clone(),
    };
    let manager = ConnectionManager::new(
        identity,
        config.manager_config(),
        resolver,
        store,
        uploader,
    );

    if let Some(events) = manager.take_events().await {
        tokio::spawn(log_events(events));
    }

    manager.start();
    manager.watch_network(Arc::new(InterfaceProbe), config.network_poll());
    manager.request_connect();

    tracing::info!("agent ready");

    // -- Main loop: wait for shutdown --
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("SIGINT received, shutting down"),
        Err(e) => tracing::error!("failed to listen for Ctrl+C: {e}"),
    }

    // -- Graceful shutdown --
    manager.shutdown().await;
    Ok(())
}

fn build_resolver(config: &Config) -> anyhow::Result<Arc<dyn ConfigResolver>> {
    if let Some(url) = &config.config_url {
        let resolver = HttpResolver::new(url.clone(), config.resolve_timeout())
            .context("building HTTP resolver")?;
        tracing::info!(url = %resolver.url(), "resolving endpoint over HTTP");
        return Ok(Arc::new(resolver));
    }
    if let Some(raw) = &config.endpoint {
        let endpoint: Endpoint = raw
            .parse()
            .with_context(|| format!("invalid endpoint {raw:?}"))?;
        tracing::info!(%endpoint, "using static endpoint");
        return Ok(Arc::new(StaticResolver::new(endpoint)));
    }
    bail!("set either `config_url` or `endpoint` in the agent configuration")
}

fn cache_path(config: &Config) -> anyhow::Result<PathBuf> {
    match &config.cache_path {
        Some(path) => Ok(path.clone()),
        None => default_cache_path().context("no config directory for the endpoint cache"),
    }
}

async fn log_events(mut events: mpsc::Receiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::StateChanged(state) => {
                tracing::info!(%state, "connection state");
            }
            ConnectionEvent::EndpointResolved {
                endpoint,
                from_cache,
            } => {
                tracing::debug!(%endpoint, from_cache, "endpoint selected");
            }
            ConnectionEvent::Reconnecting { attempt, delay } => {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            }
        }
    }
}
