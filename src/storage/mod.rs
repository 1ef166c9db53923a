//! Storage Engine Module
//!
//! This module provides the core storage functionality for lrukv.
//! It includes a thread-safe, capacity-bounded key-value store with
//! least-recently-used eviction and a background capacity reporter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐  │
//! │  │ HashMap │  │ accessed   │  │ modified   │  │remaining │  │
//! │  │ key→val │  │ Recency    │  │ Recency    │  │ capacity │  │
//! │  └─────────┘  └────────────┘  └────────────┘  └──────────┘  │
//! │                   one Mutex guards all four                 │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     CapacityReporter      │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Byte Budget**: The sum of stored value lengths never exceeds the capacity
//! - **LRU Eviction**: Least recently read keys are evicted first
//! - **Modify Order**: Entries can be streamed newest-write first
//! - **Capacity Reports**: A background task logs the remaining budget
//!
//! ## Example
//!
//! ```
//! use lrukv::storage::StorageEngine;
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new(1000);
//!
//! engine.set(Bytes::from("name"), Bytes::from("Ariz")).unwrap();
//! let value = engine.get(b"name");
//! assert_eq!(value, Some(Bytes::from("Ariz")));
//! assert_eq!(engine.remaining_capacity(), 996);
//! ```

pub mod engine;
pub mod recency;
pub mod reporter;

// Re-export commonly used types
pub use engine::{StorageEngine, StorageStats, StoreError};
pub use recency::{RecencyIndex, SortOrder, Touch};
pub use reporter::{start_capacity_reporter, CapacityReport, CapacityReporter, ReporterConfig};
