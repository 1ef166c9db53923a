//! lrukv - An In-Memory Key-Value Server with LRU Eviction
//!
//! This is the main entry point for the lrukv server.
//! It sets up the storage engine, the listeners and the capacity reporter.

use anyhow::Context;
use clap::Parser;
use lrukv::config::Config;
use lrukv::connection::{serve, ConnectionStats, Listener};
use lrukv::storage::{CapacityReporter, ReporterConfig, StorageEngine};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
lrukv v{} - In-Memory Key-Value Server with LRU Eviction
──────────────────────────────────────────────────────────────
Capacity: {} bytes
TCP:      {}
TLS:      {}

Use Ctrl+C to shutdown gracefully.
"#,
        lrukv::VERSION,
        config.capacity_bytes,
        config.tcp_listen,
        if config.enable_tls {
            config.tls_listen.as_str()
        } else {
            "disabled"
        },
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new(config.capacity_bytes));
    info!(capacity = config.capacity_bytes, "Storage engine initialized");

    let stats = Arc::new(ConnectionStats::new());

    let _reporter = CapacityReporter::start(
        Arc::clone(&storage),
        Arc::clone(&stats),
        ReporterConfig {
            interval: config.report_interval(),
        },
    );
    info!(interval_secs = config.report_interval_secs, "Capacity reporter started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut listeners = JoinSet::new();

    let tcp = Listener::bind_plain(&config.tcp_listen)
        .await
        .with_context(|| format!("failed to bind TCP listener on {}", config.tcp_listen))?;
    listeners.spawn(serve(
        tcp,
        Arc::clone(&storage),
        Arc::clone(&stats),
        shutdown_rx.clone(),
    ));

    if let Some((cert, key)) = config.tls_files() {
        info!(cert = %cert.display(), key = %key.display(), "Loading TLS certificate");
        let tls = Listener::bind_tls(&config.tls_listen, cert, key)
            .await
            .with_context(|| format!("failed to start TLS listener on {}", config.tls_listen))?;
        listeners.spawn(serve(
            tls,
            Arc::clone(&storage),
            Arc::clone(&stats),
            shutdown_rx.clone(),
        ));
    }

    signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    info!("Shutdown signal received, stopping server...");

    let _ = shutdown_tx.send(true);
    while let Some(result) = listeners.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Listener task failed");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
