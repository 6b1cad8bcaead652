#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use super::connection::ConnectionState;
use crate::error::{Error, Kind};

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// The opening handshake did not finish in time
    ConnectTimeout {
        url: String,
        after: Duration,
    },
    /// A send was attempted while the connection was not open
    NotOpen {
        state: ConnectionState,
    },
    /// No pong arrived within the keep-alive window
    HeartbeatTimeout {
        url: String,
        after: Duration,
    },
    /// A correlated request received no reply in time
    RequestTimeout {
        id: String,
        after: Duration,
    },
    /// A request with the same id is already waiting for a reply
    DuplicateRequest(String),
    /// Received a frame that is not valid at this point of the exchange
    UnexpectedFrame(String),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::ConnectTimeout { url, after } => {
                write!(f, "Connection to {url} timed out after {after:?}")
            }
            Self::NotOpen { state } => write!(f, "WebSocket connection is not open ({state})"),
            Self::HeartbeatTimeout { url, after } => write!(
                f,
                "Connection to {url} timed out due to a ping-pong keepalive missing on time ({after:?})"
            ),
            Self::RequestTimeout { id, after } => {
                write!(f, "Request {id} received no reply within {after:?}")
            }
            Self::DuplicateRequest(id) => write!(f, "Request {id} is already pending"),
            Self::UnexpectedFrame(msg) => write!(f, "Unexpected WebSocket frame: {msg}"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl WsError {
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Connection(_) | Self::ConnectTimeout { .. } => Kind::Network,
            Self::HeartbeatTimeout { .. } | Self::RequestTimeout { .. } => Kind::Timeout,
            Self::NotOpen { .. } => Kind::Closed,
            Self::DuplicateRequest(_) => Kind::Validation,
            Self::UnexpectedFrame(_) => Kind::Protocol,
        }
    }
}

// Integration with main Error type
impl From<WsError> for Error {
    fn from(e: WsError) -> Self {
        Error::with_source(e.kind(), e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        WsError::Connection(e).into()
    }
}
