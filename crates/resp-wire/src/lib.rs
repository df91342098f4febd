//! RESP-style wire codec shared by the graph client.
//!
//! Requests are always sent as an array of bulk strings. Replies are decoded
//! incrementally: [`decode_one`] looks at the front of a receive buffer and
//! either reports that more bytes are needed, or returns one complete reply
//! together with the number of bytes it occupied.

mod decode;
mod encode;

pub use decode::{Decoded, MAX_NESTING_DEPTH, decode_one};
pub use encode::{Argument, encode_request};

use std::fmt;

pub const CRLF: &[u8] = b"\r\n";

/// A successfully decoded reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `+OK\r\n`
    Simple(String),
    /// `:42\r\n`
    Integer(i64),
    /// `$3\r\nfoo\r\n`, or `$-1\r\n` for null
    Bulk(Option<String>),
    /// `*2\r\n...`, or `*-1\r\n` for null
    Array(Option<Vec<Value>>),
}

/// A reply that decoded to a failure rather than a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    /// The server answered with an error frame (`-ERR ...`).
    Server(String),
    /// The byte stream is not valid protocol. The stream cannot be resynchronized.
    Protocol(String),
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(message) => write!(f, "{message}"),
            Self::Protocol(message) => write!(f, "protocol error: {message}"),
        }
    }
}

impl std::error::Error for ReplyError {}
