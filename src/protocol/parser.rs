//! Command Line Parser
//!
//! This module turns one request line into a validated [`Command`].
//!
//! ## Grammar
//!
//! Keywords are case-sensitive and tokens are separated by exactly one space.
//! There is no quoting.
//!
//! ```text
//! SET <key> <size>     followed by one payload line
//! GET <key>
//! DELETE <key>
//! STREAM
//! ```
//!
//! The parser never reads the payload line itself. It reports through
//! [`Command::expects_payload_line`] that the caller has to read one more
//! line and use up to `<size>` bytes of it as the value.
//!
//! The parser is stateless: each call looks at one line only.

use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing a command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Wrong number of arguments for a known command
    #[error("{command} invalid arguments")]
    InvalidArguments { command: &'static str },

    /// The size argument of SET is not a non-negative integer
    #[error("SET invalid size: {0}")]
    InvalidSize(String),

    /// The leading token is not a known command
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Command keywords
pub mod keyword {
    pub const SET: &[u8] = b"SET";
    pub const GET: &[u8] = b"GET";
    pub const DELETE: &[u8] = b"DELETE";
    pub const STREAM: &[u8] = b"STREAM";
}

/// A validated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store the next line's first `size` bytes under `key`
    Set { key: Bytes, size: usize },
    /// Fetch the value of `key`
    Get { key: Bytes },
    /// Remove `key`
    Delete { key: Bytes },
    /// List every entry, most recently modified first
    Stream,
}

impl Command {
    /// The command keyword.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Delete { .. } => "DELETE",
            Command::Stream => "STREAM",
        }
    }

    /// The arguments as they appeared on the line.
    pub fn args(&self) -> Vec<Bytes> {
        match self {
            Command::Set { key, size } => vec![key.clone(), Bytes::from(size.to_string())],
            Command::Get { key } | Command::Delete { key } => vec![key.clone()],
            Command::Stream => Vec::new(),
        }
    }

    /// Returns true if the caller must read a payload line before dispatching.
    pub fn expects_payload_line(&self) -> bool {
        self.payload_size().is_some()
    }

    /// The number of payload bytes to keep, for commands that take a payload.
    pub fn payload_size(&self) -> Option<usize> {
        match self {
            Command::Set { size, .. } => Some(*size),
            _ => None,
        }
    }
}

/// Parses one command line.
///
/// `line` must not include its line terminator; see [`strip_line_ending`].
///
/// # Example
///
/// ```
/// use lrukv::protocol::{parse_command, Command};
/// use bytes::Bytes;
///
/// let command = parse_command(b"SET foo 3").unwrap();
/// assert_eq!(command, Command::Set { key: Bytes::from("foo"), size: 3 });
/// assert!(command.expects_payload_line());
/// ```
pub fn parse_command(line: &[u8]) -> ParseResult<Command> {
    let mut tokens = line.split(|&b| b == b' ');
    let name = tokens.next().unwrap_or_default();
    let args: Vec<&[u8]> = tokens.collect();

    match name {
        keyword::SET => {
            let [key, size] = args[..] else {
                return Err(ParseError::InvalidArguments { command: "SET" });
            };
            let size = parse_size(size)?;
            Ok(Command::Set {
                key: Bytes::copy_from_slice(key),
                size,
            })
        }
        keyword::GET => {
            let [key] = args[..] else {
                return Err(ParseError::InvalidArguments { command: "GET" });
            };
            Ok(Command::Get {
                key: Bytes::copy_from_slice(key),
            })
        }
        keyword::DELETE => {
            let [key] = args[..] else {
                return Err(ParseError::InvalidArguments { command: "DELETE" });
            };
            Ok(Command::Delete {
                key: Bytes::copy_from_slice(key),
            })
        }
        keyword::STREAM => {
            if !args.is_empty() {
                return Err(ParseError::InvalidArguments { command: "STREAM" });
            }
            Ok(Command::Stream)
        }
        other => Err(ParseError::UnknownCommand(
            String::from_utf8_lossy(other).into_owned(),
        )),
    }
}

/// Parses the `<size>` argument of SET.
fn parse_size(token: &[u8]) -> ParseResult<usize> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| ParseError::InvalidSize(String::from_utf8_lossy(token).into_owned()))
}

/// Strips a trailing `\n` and then a trailing `\r` from a line.
#[inline]
pub fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
