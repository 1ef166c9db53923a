//! Line Protocol Implementation
//!
//! This module implements the text protocol spoken between lrukv and its
//! clients.
//!
//! ## Overview
//!
//! Each request is a single line of space-separated tokens. `SET` is the one
//! command followed by a second line, the payload, carrying the raw value.
//! Replies are CRLF-terminated lines.
//!
//! ## Modules
//!
//! - `parser`: Validates a request line into a `Command`
//! - `types`: Defines the `Reply` enum and serialization
//!
//! ## Example
//!
//! ```
//! use lrukv::protocol::{parse_command, Command, Reply};
//! use bytes::Bytes;
//!
//! // Parsing an incoming line
//! let command = parse_command(b"GET name").unwrap();
//! assert_eq!(command, Command::Get { key: Bytes::from("name") });
//!
//! // Creating replies
//! let reply = Reply::value(Bytes::from("Ariz"));
//! assert_eq!(reply.serialize(), b"VALUE 4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_command, strip_line_ending, Command, ParseError, ParseResult};
pub use types::Reply;
