//! Connection Module
//!
//! This module manages client connections to lrukv.
//! Each client connection is handled by its own async task, so one slow
//! client never blocks the others.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │   TCP Listener       │      │   TLS Listener       │
//! │   (0.0.0.0:2020)     │      │   (0.0.0.0:2021)     │
//! └──────────┬───────────┘      └──────────┬───────────┘
//!            │ accept()                    │ accept() + handshake
//!            ▼                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler (per client)              │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read line   │───>│ Parse line  │───>│ Execute cmd │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send reply  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use lrukv::connection::{serve, ConnectionStats, Listener};
//! use lrukv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new(1000));
//! let stats = Arc::new(ConnectionStats::new());
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let listener = Listener::bind_plain("0.0.0.0:2020").await?;
//! serve(listener, storage, stats, shutdown_rx).await;
//! ```

pub mod handler;
pub mod listener;

// Re-export commonly used types
pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, MAX_COMMAND_LINE,
    MAX_PAYLOAD_LINE,
};
pub use listener::{load_tls_config, serve, Listener, ListenerError};
