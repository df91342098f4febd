use resp_wire::ReplyError;
use std::fmt;
use std::time::Duration;

/// Failure of a single request.
///
/// Transport failures are delivered to every outstanding request at once, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The server answered with an error frame.
    Server(String),
    /// The server sent bytes that are not valid protocol.
    Protocol(String),
    /// The socket failed.
    Transport(String),
    /// The peer closed the connection.
    Closed,
    Timeout(Duration),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(message) => write!(f, "{message}"),
            Self::Protocol(message) => write!(f, "protocol error: {message}"),
            Self::Transport(message) => write!(f, "{message}"),
            Self::Closed => write!(f, "Socket closed."),
            Self::Timeout(limit) => {
                write!(f, "No reply within {}", humantime::format_duration(*limit))
            }
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ReplyError> for ClientError {
    fn from(value: ReplyError) -> Self {
        match value {
            ReplyError::Server(message) => Self::Server(message),
            ReplyError::Protocol(message) => Self::Protocol(message),
        }
    }
}
