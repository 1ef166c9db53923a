//! Command Handler Module
//!
//! This module implements the four lrukv commands.
//! It receives parsed commands, executes them against the storage engine,
//! and returns the reply to write back.
//!
//! ## Supported Commands
//!
//! - `SET key size` + payload line - Store a value (evicting if needed)
//! - `GET key` - Fetch a value (missing keys yield an empty value)
//! - `DELETE key` - Remove a key (no error if absent)
//! - `STREAM` - List every entry, most recently modified first
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  Command    │───>│  execute()  │───>│   Reply     │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                            │                                │
//! │                            ▼                                │
//! │                      StorageEngine                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::protocol::{Command, Reply};
use crate::storage::{StorageEngine, StoreError};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, trace};

/// Executes commands against the shared storage engine.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the reply.
    ///
    /// # Arguments
    ///
    /// * `command` - The parsed command
    /// * `payload` - The payload line for `SET`; `None` when the client
    ///   disconnected before sending it, or for commands without a payload
    pub fn execute(&self, command: Command, payload: Option<Bytes>) -> Reply {
        trace!(command = command.name(), "Executing command");

        match command {
            Command::Set { key, size } => self.cmd_set(key, size, payload.unwrap_or_default()),
            Command::Get { key } => self.cmd_get(&key),
            Command::Delete { key } => self.cmd_delete(&key),
            Command::Stream => self.cmd_stream(),
        }
    }

    /// SET key size
    ///
    /// Stores at most `size` bytes of the payload.
    fn cmd_set(&self, key: Bytes, size: usize, mut payload: Bytes) -> Reply {
        payload.truncate(size);

        match self.storage.set(key, payload) {
            Ok(()) => Reply::Ok,
            Err(e @ StoreError::ValueTooLarge { .. }) => {
                debug!(error = %e, "Rejected SET");
                Reply::error_with("value too large")
            }
        }
    }

    /// GET key
    fn cmd_get(&self, key: &[u8]) -> Reply {
        Reply::Value(self.storage.get(key).unwrap_or_default())
    }

    /// DELETE key
    fn cmd_delete(&self, key: &[u8]) -> Reply {
        self.storage.delete(key);
        Reply::Ok
    }

    /// STREAM
    fn cmd_stream(&self) -> Reply {
        Reply::Entries(self.storage.stream_snapshot())
    }
}
