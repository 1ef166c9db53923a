//! Line Protocol Reply Types
//!
//! This module defines the replies the server writes back to clients.
//! Every reply is one or more lines terminated with CRLF (`\r\n`).
//!
//! ## Wire Format
//!
//! ```text
//! OK\r\n                          success of SET / DELETE
//! VALUE 3\r\nbar\r\n              GET hit ("VALUE 0\r\n\r\n" on a miss)
//! a 1\r\nb 2\r\nOK\r\n            STREAM, newest write first
//! ERROR\r\n                       malformed command (connection then closes)
//! ERROR value too large\r\n       rejected SET (connection stays open)
//! ```

use bytes::Bytes;

/// The CRLF terminator used on every reply line
pub const CRLF: &[u8] = b"\r\n";

/// Reply keywords
pub mod keyword {
    pub const OK: &[u8] = b"OK";
    pub const VALUE: &[u8] = b"VALUE";
    pub const ERROR: &[u8] = b"ERROR";
}

/// A reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The command succeeded.
    /// Format: `OK\r\n`
    Ok,

    /// The value stored under a key; empty when the key is missing.
    /// Format: `VALUE <len>\r\n<bytes>\r\n`
    Value(Bytes),

    /// Key/value pairs in stream order, followed by `OK`.
    /// Format: `<key> <value>\r\n` per entry, then `OK\r\n`
    Entries(Vec<(Bytes, Bytes)>),

    /// The command failed, with an optional reason.
    /// Format: `ERROR\r\n` or `ERROR <reason>\r\n`
    Error(Option<String>),
}

impl Reply {
    /// Creates a value reply.
    pub fn value(data: impl Into<Bytes>) -> Self {
        Reply::Value(data.into())
    }

    /// Creates a bare error reply.
    pub fn error() -> Self {
        Reply::Error(None)
    }

    /// Creates an error reply carrying a reason.
    ///
    /// # Example
    /// ```
    /// use lrukv::protocol::types::Reply;
    /// let err = Reply::error_with("value too large");
    /// assert_eq!(err.serialize(), b"ERROR value too large\r\n");
    /// ```
    pub fn error_with(reason: impl Into<String>) -> Self {
        Reply::Error(Some(reason.into()))
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Ok => {
                buf.extend_from_slice(keyword::OK);
                buf.extend_from_slice(CRLF);
            }
            Reply::Value(data) => {
                buf.extend_from_slice(keyword::VALUE);
                buf.push(b' ');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Reply::Entries(entries) => {
                for (key, value) in entries {
                    buf.extend_from_slice(key);
                    buf.push(b' ');
                    buf.extend_from_slice(value);
                    buf.extend_from_slice(CRLF);
                }
                Reply::Ok.serialize_into(buf);
            }
            Reply::Error(reason) => {
                buf.extend_from_slice(keyword::ERROR);
                if let Some(reason) = reason {
                    buf.push(b' ');
                    buf.extend_from_slice(reason.as_bytes());
                }
                buf.extend_from_slice(CRLF);
            }
        }
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_ok() {
        assert_eq!(Reply::Ok.serialize(), b"OK\r\n");
    }

    #[test]
    fn test_serialize_value() {
        assert_eq!(Reply::value("bar").serialize(), b"VALUE 3\r\nbar\r\n");
    }

    #[test]
    fn test_serialize_missing_value() {
        assert_eq!(Reply::value(Bytes::new()).serialize(), b"VALUE 0\r\n\r\n");
    }

    #[test]
    fn test_serialize_entries() {
        let reply = Reply::Entries(vec![
            (Bytes::from("a"), Bytes::from("1")),
            (Bytes::from("b"), Bytes::from("22")),
        ]);
        assert_eq!(reply.serialize(), b"a 1\r\nb 22\r\nOK\r\n");
    }

    #[test]
    fn test_serialize_empty_stream() {
        assert_eq!(Reply::Entries(vec![]).serialize(), b"OK\r\n");
    }

    #[test]
    fn test_serialize_errors() {
        assert_eq!(Reply::error().serialize(), b"ERROR\r\n");
        assert!(Reply::error().is_error());
        assert!(!Reply::Ok.is_error());
    }

    #[test]
    fn test_serialize_into_appends() {
        let mut buf = b"prefix ".to_vec();
        Reply::Ok.serialize_into(&mut buf);
        assert_eq!(buf, b"prefix OK\r\n");
    }
}
