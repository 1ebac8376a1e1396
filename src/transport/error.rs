//! Transport error types.

use std::time::Duration;

use thiserror::Error;

use crate::transport::frame::AuthKind;
use crate::transport::listener::ListenerError;

/// Failure reading or writing a single frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// An application frame that could not be turned into a [`Message`].
///
/// Not terminal: the frame is skipped and the connection keeps reading.
///
/// [`Message`]: crate::transport::frame::Message
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid message JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected frame type `{0}`")]
    UnexpectedType(String),
}

/// Why an authentication handshake failed.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed during handshake")]
    Closed,

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("malformed handshake frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("expected {expected} frame, got {got}")]
    UnexpectedFrame { expected: AuthKind, got: AuthKind },

    #[error("handshake frame is missing `{0}`")]
    MissingField(&'static str),

    #[error("peer sent an empty node id")]
    EmptyNodeId,

    #[error("peer claims our own node id")]
    SelfConnection,

    #[error("peer {claimed} answered as {actual}")]
    IdentityMismatch { claimed: String, actual: String },

    #[error("authentication failed for peer {peer_id}")]
    ResponseMismatch { peer_id: String },
}

impl HandshakeError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            HandshakeError::Timeout(_) => "timeout",
            HandshakeError::Closed => "closed",
            HandshakeError::Frame(_) => "frame",
            HandshakeError::Malformed(_) => "malformed",
            HandshakeError::UnexpectedFrame { .. } => "unexpected_frame",
            HandshakeError::MissingField(_) => "missing_field",
            HandshakeError::EmptyNodeId => "empty_node_id",
            HandshakeError::SelfConnection => "self_connection",
            HandshakeError::IdentityMismatch { .. } => "identity_mismatch",
            HandshakeError::ResponseMismatch { .. } => "response_mismatch",
        }
    }
}

/// Errors surfaced to transport callers.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to listen: {0}")]
    Listen(#[from] ListenerError),

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to {address} timed out after {after:?}")]
    ConnectTimeout { address: String, after: Duration },

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("no connection to peer {0}")]
    NotConnected(String),

    #[error("failed to write to peer {peer_id}: {source}")]
    Write {
        peer_id: String,
        #[source]
        source: FrameError,
    },

    #[error("write to peer {peer_id} timed out after {after:?}")]
    WriteTimeout { peer_id: String, after: Duration },

    #[error("message is {size} bytes, over the {limit} byte frame limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("transport is shutting down")]
    ShuttingDown,

    #[error("transport already started")]
    AlreadyStarted,
}
