// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cadence serve` command implementation.
//!
//! Opens the SQLite store, builds one webhook adapter per configured
//! platform, and runs the dispatcher until a shutdown signal arrives.
//! Engine events are logged; channel pauses are logged as alerts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cadence_config::CadenceConfig;
use cadence_core::{CadenceError, PublishStore};
use cadence_engine::{AdapterRegistry, EngineContext, EngineEvent, PublishingEngine, shutdown};
use cadence_storage::SqliteStore;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Open the store and wire the configured platforms into an engine.
pub async fn build_engine(config: &CadenceConfig) -> Result<PublishingEngine, CadenceError> {
    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;

    let timeout = Duration::from_secs(config.engine.delivery_timeout_secs);
    let mut adapters = AdapterRegistry::new();
    for adapter in cadence_webhook::from_config(&config.platforms, timeout)? {
        info!(target = %adapter.target(), "platform adapter registered");
        adapters.register(adapter);
    }
    if config.platforms.is_empty() {
        warn!("no [[platforms]] configured; items cannot be delivered");
    }

    let ctx = EngineContext::new(Arc::new(store), adapters, config.clone());
    Ok(PublishingEngine::new(ctx))
}

/// Runs the `cadence serve` command.
pub async fn run_serve(config: CadenceConfig) -> Result<(), CadenceError> {
    init_tracing(&config.engine.log_level);
    info!("starting cadence serve");

    if config.metrics.enabled {
        install_prometheus(&config.metrics.listen_address)?;
    } else {
        debug!("prometheus metrics disabled by configuration");
    }
    cadence_engine::metrics::register_metrics();

    let engine = build_engine(&config).await?;
    let cancel = shutdown::install_signal_handler();

    let events = tokio::spawn(log_events(engine.clone(), cancel.clone()));

    engine.dispatcher().run(cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = events.await {
        warn!(error = %e, "event logger task failed");
    }
    engine.shutdown().await?;
    info!("cadence serve stopped");
    Ok(())
}

fn install_prometheus(listen_address: &str) -> Result<(), CadenceError> {
    let addr: SocketAddr = listen_address
        .parse()
        .map_err(|e| CadenceError::Config(format!("invalid metrics.listen_address: {e}")))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| CadenceError::Internal(format!("failed to install Prometheus exporter: {e}")))?;
    info!(%addr, "prometheus metrics enabled");
    Ok(())
}

async fn log_events(engine: PublishingEngine, cancel: CancellationToken) {
    let mut events = engine.subscribe();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    }
}

fn log_event(event: &EngineEvent) {
    let rendered = serde_json::to_string(event).unwrap_or_default();
    match event {
        EngineEvent::ChannelPaused {
            channel_id, reason, ..
        } => {
            warn!(%channel_id, %reason, event = %rendered, "ALERT: channel auto-paused");
        }
        EngineEvent::ItemFailed { item_id, reason, .. } => {
            warn!(%item_id, %reason, "item failed");
        }
        _ => info!(event = %rendered, "engine event"),
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cadence={log_level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
