//! # lrukv - An In-Memory Key-Value Server with LRU Eviction
//!
//! lrukv keeps byte-string values in memory under a fixed byte budget and
//! serves them over a small line protocol, on plain TCP and optionally TLS.
//! When a write does not fit, the least recently read keys are evicted
//! until it does.
//!
//! ## Features
//!
//! - **Byte Budget**: The total size of stored values never exceeds the capacity
//! - **LRU Eviction**: Keys that were never read go first, then the oldest reads
//! - **Write-Ordered Streaming**: `STREAM` lists entries newest write first
//! - **Async I/O**: Built on Tokio, one task per client
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               lrukv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP / TLS   │───>│ Connection  │───>│  Command    │                  │
//! │  │ Listener    │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   Line      │    │              StorageEngine                   │   │
//! │  │   Parser    │    │  values + accessed order + modified order    │   │
//! │  └─────────────┘    │              behind one Mutex                │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           CapacityReporter                      │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use lrukv::connection::{serve, ConnectionStats, Listener};
//! use lrukv::storage::{start_capacity_reporter, StorageEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new(1000));
//!     let stats = Arc::new(ConnectionStats::new());
//!     let _reporter = start_capacity_reporter(Arc::clone(&storage), Arc::clone(&stats));
//!
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let listener = Listener::bind_plain("0.0.0.0:2020").await?;
//!     serve(listener, storage, stats, shutdown_rx).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key size` followed by a payload line
//! - `GET key`
//! - `DELETE key`
//! - `STREAM`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Command line parser and reply encoding
//! - [`storage`]: Capacity-bounded store, recency indexes and the reporter
//! - [`commands`]: Executes parsed commands against the store
//! - [`connection`]: Listeners and per-client connection handling
//! - [`config`]: Command-line and environment configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, serve, ConnectionStats, Listener};
pub use protocol::{parse_command, Command, ParseError, Reply};
pub use storage::{start_capacity_reporter, CapacityReporter, StorageEngine, StoreError};

/// The default capacity in bytes
pub const DEFAULT_CAPACITY: usize = 1000;

/// The default plain TCP listen address
pub const DEFAULT_TCP_LISTEN: &str = "0.0.0.0:2020";

/// The default TLS listen address
pub const DEFAULT_TLS_LISTEN: &str = "0.0.0.0:2021";

/// Version of lrukv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
