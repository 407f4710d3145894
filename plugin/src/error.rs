//! Error types
//!
//! Every boundary in the crate (message construction, reply mutation,
//! connection routing, the bridge itself) reports failures as explicit values.
//! Engine-side cancellation is not a fault, but it travels through the same
//! `ReplyError` channel so handler code can stop producing.

use thiserror::Error;

use crate::websocket::ConnectionId;

/// Invalid input while building a [`Message`](crate::Message).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("header names must not be empty")]
    EmptyHeaderName,

    #[error("value of header {name:?} is not valid UTF-8 text")]
    InvalidHeaderValue { name: String },
}

/// Failure of a respond/write/close on a fake reply.
#[derive(Error, Debug)]
pub enum ReplyError {
    /// The engine cancelled the request. Stop producing.
    #[error("reply was aborted by the engine")]
    Aborted,

    #[error("reply has already been responded to")]
    AlreadyResponded,

    #[error("reply has not been responded to yet")]
    NotResponded,

    #[error("reply is not a streaming reply")]
    NotStreaming,

    #[error("streaming reply is already closed")]
    Closed,

    /// The event loop owning the reply is gone.
    #[error("event loop is no longer running")]
    Detached,

    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),
}

impl ReplyError {
    /// True when the failure is the normal cancellation path rather than a bug.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ReplyError::Aborted)
    }
}

impl From<BridgeError> for ReplyError {
    fn from(_: BridgeError) -> Self {
        ReplyError::Detached
    }
}

/// Failure of a WebSocket routing operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// The id is unknown or the connection was already closed.
    #[error("websocket {0} not found")]
    NotFound(ConnectionId),

    /// The handler has not accepted the connection yet.
    #[error("websocket {0} is not open")]
    NotOpen(ConnectionId),

    #[error("websocket {0} was already accepted")]
    AlreadyAccepted(ConnectionId),

    #[error("event loop is no longer running")]
    Detached,
}

impl From<BridgeError> for SocketError {
    fn from(_: BridgeError) -> Self {
        SocketError::Detached
    }
}

/// Failure while intercepting an engine request.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("invalid request url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Message(#[from] MessageError),
}

/// The event loop behind a bridge has shut down.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    #[error("event loop is closed")]
    Closed,
}

/// Failure loading a [`DispatchConfig`](crate::DispatchConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
