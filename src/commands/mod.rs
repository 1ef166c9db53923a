//! Command Handler Module
//!
//! This module implements the command processing layer for lrukv.
//! It receives parsed commands, executes them against the storage engine,
//! and returns appropriate replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Execute      │
//! │  - Reply        │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET`, `GET`, `DELETE`, `STREAM`

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
