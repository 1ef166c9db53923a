//! Background Capacity Reporter
//!
//! This module implements a background task that periodically logs how much
//! of the store's byte budget is left, together with key and connection
//! counts. The report is advisory only; nothing reads it back.
//!
//! ## Design
//!
//! The reporter runs as a Tokio task and:
//! 1. Sleeps for a configurable interval (default: 10s)
//! 2. Wakes up and takes a statistics snapshot
//! 3. Logs it at `info` level
//!
//! It stops when its handle is dropped or `stop()` is called.

use crate::connection::ConnectionStats;
use crate::storage::{StorageEngine, StorageStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Configuration for the capacity reporter.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Interval between reports (default: 10s)
    pub interval: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// A handle to the running capacity reporter.
///
/// When this handle is dropped, the reporter task will be stopped.
#[derive(Debug)]
pub struct CapacityReporter {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    /// Number of reports emitted so far
    reports: Arc<AtomicU64>,
}

impl CapacityReporter {
    /// Starts the capacity reporter as a background task.
    ///
    /// # Arguments
    ///
    /// * `engine` - The storage engine to report on
    /// * `stats` - Connection statistics shared with the listeners
    /// * `config` - Configuration for the reporter
    ///
    /// # Example
    ///
    /// ```ignore
    /// use lrukv::storage::{StorageEngine, CapacityReporter, ReporterConfig};
    /// use lrukv::connection::ConnectionStats;
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new(1000));
    /// let stats = Arc::new(ConnectionStats::new());
    /// let reporter = CapacityReporter::start(engine, stats, ReporterConfig::default());
    ///
    /// // Dropping the reporter will stop it
    /// drop(reporter);
    /// ```
    pub fn start(
        engine: Arc<StorageEngine>,
        stats: Arc<ConnectionStats>,
        config: ReporterConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reports = Arc::new(AtomicU64::new(0));

        tokio::spawn(reporter_loop(
            engine,
            stats,
            config,
            Arc::clone(&reports),
            shutdown_rx,
        ));

        debug!("Capacity reporter started");

        Self {
            shutdown_tx,
            reports,
        }
    }

    /// Returns how many reports have been logged.
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    /// Stops the capacity reporter.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            debug!("Capacity reporter stopped");
        }
    }
}

impl Drop for CapacityReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything one capacity report logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityReport {
    /// Store counters and capacity
    pub storage: StorageStats,
    /// Bytes held by values
    pub used: u64,
    pub active_connections: u64,
    pub commands: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl CapacityReport {
    /// Takes a snapshot of the store and connection counters.
    pub fn collect(engine: &StorageEngine, stats: &ConnectionStats) -> Self {
        Self {
            storage: engine.stats(),
            used: engine.used_bytes() as u64,
            active_connections: stats.active_connections.load(Ordering::Relaxed),
            commands: stats.commands_processed.load(Ordering::Relaxed),
            bytes_read: stats.bytes_read.load(Ordering::Relaxed),
            bytes_written: stats.bytes_written.load(Ordering::Relaxed),
        }
    }

    fn log(&self) {
        info!(
            capacity_left = self.storage.remaining,
            capacity = self.storage.capacity,
            used = self.used,
            keys = self.storage.keys,
            get_ops = self.storage.get_ops,
            set_ops = self.storage.set_ops,
            del_ops = self.storage.del_ops,
            evicted = self.storage.evicted,
            rejected = self.storage.rejected,
            active_connections = self.active_connections,
            commands = self.commands,
            bytes_read = self.bytes_read,
            bytes_written = self.bytes_written,
            "Capacity report"
        );
    }
}

/// The main reporter loop.
async fn reporter_loop(
    engine: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
    config: ReporterConfig,
    reports: Arc<AtomicU64>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Capacity reporter received shutdown signal");
                    return;
                }
            }
        }

        CapacityReport::collect(&engine, &stats).log();
        reports.fetch_add(1, Ordering::Relaxed);
    }
}

/// Starts the capacity reporter with default configuration.
pub fn start_capacity_reporter(
    engine: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
) -> CapacityReporter {
    CapacityReporter::start(engine, stats, ReporterConfig::default())
}
