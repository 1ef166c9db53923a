//! Connection Handler Module
//!
//! This module handles individual client connections to lrukv.
//! Each client gets its own handler task that runs in a loop,
//! reading command lines and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP or TLS handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read command line       │◄┼── blank line: read again
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Parse command           │─┼── error: send ERROR, close
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read payload line (SET) │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute command         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send reply              │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / error
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! ## Line Limits
//!
//! Command lines may be at most 64 KiB and payload lines at most 512 MiB,
//! terminator included. A longer line gets an `ERROR` reply and the
//! connection is closed. Only the first `<size>` bytes of a payload line are
//! buffered; the rest is skipped as it arrives.

use crate::commands::CommandHandler;
use crate::protocol::{parse_command, strip_line_ending, ParseError, Reply};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tracing::{debug, info, trace, warn};

/// Maximum size of a command line, terminator included (64 KB)
pub const MAX_COMMAND_LINE: usize = 64 * 1024;

/// Maximum size of a payload line, terminator included (512 MB)
pub const MAX_PAYLOAD_LINE: usize = 512 * 1024 * 1024;

/// Initial capacity of the line buffer
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// This struct owns the buffered stream and drives the
/// read-parse-execute-reply loop for one connected client.
pub struct ConnectionHandler<S> {
    /// The byte stream for this connection (plain TCP or TLS)
    stream: BufStream<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for the line being read
    line: Vec<u8>,

    /// Buffer for the reply being written
    out: Vec<u8>,

    /// The command handler (shared storage)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The byte stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufStream::new(stream),
            addr,
            line: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            out: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// This method reads commands from the client, executes them,
    /// and sends back replies until the client disconnects or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::Io(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection closed with error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let line = match self.read_line(MAX_COMMAND_LINE).await {
                Ok(Some(line)) => line,
                Ok(None) => return Err(ConnectionError::ClientDisconnected),
                Err(e @ ConnectionError::LineTooLong { .. }) => {
                    self.send_reply(&Reply::error()).await?;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };

            // Blank lines are keep-alives
            if line.is_empty() {
                trace!(client = %self.addr, "Skipped blank line");
                continue;
            }

            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(e) => {
                    self.send_reply(&Reply::error()).await?;
                    return Err(ConnectionError::Parse(e));
                }
            };
            trace!(
                client = %self.addr,
                command = command.name(),
                args = ?command.args(),
                payload = command.expects_payload_line(),
                "Parsed command"
            );

            // A client that hangs up before the payload stores an empty value
            let payload = match command.payload_size() {
                Some(size) => match self.read_payload(size).await {
                    Ok(payload) => payload,
                    Err(e @ ConnectionError::LineTooLong { .. }) => {
                        self.send_reply(&Reply::error()).await?;
                        return Err(e);
                    }
                    Err(e) => return Err(e),
                },
                None => None,
            };

            let name = command.name();
            let reply = self.command_handler.execute(command, payload);
            self.stats.command_processed();
            if reply.is_error() {
                debug!(client = %self.addr, command = name, "Command rejected");
            }

            self.send_reply(&reply).await?;

            self.line.shrink_to(INITIAL_BUFFER_SIZE);
            self.out.shrink_to(INITIAL_BUFFER_SIZE);
        }
    }

    /// Reads one line of at most `limit` bytes and strips its terminator.
    ///
    /// Returns `None` at end of stream. A final line without terminator is
    /// returned as-is.
    async fn read_line(&mut self, limit: usize) -> Result<Option<Bytes>, ConnectionError> {
        self.line.clear();

        let n = (&mut self.stream)
            .take(limit as u64)
            .read_until(b'\n', &mut self.line)
            .await?;

        if n == 0 {
            return Ok(None);
        }

        self.stats.bytes_read(n);

        if n == limit && !self.line.ends_with(b"\n") {
            return Err(ConnectionError::LineTooLong { limit });
        }

        trace!(client = %self.addr, bytes = n, "Read line");
        Ok(Some(Bytes::copy_from_slice(strip_line_ending(&self.line))))
    }

    /// Reads a payload line, keeping at most `size` bytes of it.
    ///
    /// Bytes past `size` are discarded as they arrive, so memory use follows
    /// the declared size and not the line length. Returns `None` at end of
    /// stream.
    async fn read_payload(&mut self, size: usize) -> Result<Option<Bytes>, ConnectionError> {
        self.line.clear();

        // Room for the value plus its "\r\n"
        let kept = size.saturating_add(2).min(MAX_PAYLOAD_LINE);
        let n = (&mut self.stream)
            .take(kept as u64)
            .read_until(b'\n', &mut self.line)
            .await?;

        if n == 0 {
            return Ok(None);
        }

        self.stats.bytes_read(n);

        let value = if self.line.ends_with(b"\n") || n < kept {
            strip_line_ending(&self.line)
        } else {
            if n >= MAX_PAYLOAD_LINE {
                return Err(ConnectionError::LineTooLong {
                    limit: MAX_PAYLOAD_LINE,
                });
            }
            let skipped = self.skip_line(MAX_PAYLOAD_LINE - n).await?;
            trace!(client = %self.addr, bytes = skipped, "Discarded payload overflow");
            &self.line[..size]
        };

        let value = &value[..value.len().min(size)];
        trace!(client = %self.addr, bytes = n, "Read payload");
        Ok(Some(Bytes::copy_from_slice(value)))
    }

    /// Consumes the rest of the current line without buffering it.
    ///
    /// Fails with `LineTooLong` once more than `limit` bytes were skipped.
    async fn skip_line(&mut self, limit: usize) -> Result<usize, ConnectionError> {
        let mut skipped = 0;

        loop {
            let chunk = self.stream.fill_buf().await?;
            if chunk.is_empty() {
                return Ok(skipped);
            }

            let (used, done) = match chunk.iter().position(|&b| b == b'\n') {
                Some(end) => (end + 1, true),
                None => (chunk.len(), false),
            };
            self.stream.consume(used);
            self.stats.bytes_read(used);
            skipped += used;

            if skipped > limit || (!done && skipped == limit) {
                return Err(ConnectionError::LineTooLong {
                    limit: MAX_PAYLOAD_LINE,
                });
            }
            if done {
                return Ok(skipped);
            }
        }
    }

    /// Sends a reply to the client.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        self.out.clear();
        reply.serialize_into(&mut self.out);

        self.stream.write_all(&self.out).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(self.out.len());
        trace!(
            client = %self.addr,
            bytes = self.out.len(),
            "Sent reply"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed command line
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// A line exceeded its size limit
    #[error("Line longer than {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
///
/// # Arguments
///
/// * `stream` - The byte stream for this connection
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing commands
/// * `stats` - Shared connection statistics
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
