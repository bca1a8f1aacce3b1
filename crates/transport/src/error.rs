//! Error types for the transport layer.

use crate::codec::MAX_FRAME_SIZE;
use corelib::Identifier;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised while talking to a peer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket-level failure (connect, read, write).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame's payload did not (de)serialize.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Frame larger than [`MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max {MAX_FRAME_SIZE})")]
    FrameTooLarge { size: usize },

    /// The peer closed the connection before answering.
    #[error("connection closed before a response arrived")]
    Closed,

    /// The peer answered with a response of the wrong kind.
    #[error("unexpected response to {command}: {response}")]
    UnexpectedResponse {
        command: &'static str,
        response: String,
    },

    /// The peer answered `Err`.
    #[error("peer rejected request: {0}")]
    Rejected(String),
}

impl TransportError {
    /// True when the peer was not listening yet.
    pub fn is_refused(&self) -> bool {
        matches!(self, TransportError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionRefused)
    }

    /// Converts into the ring-level error raised by a call to `node`.
    pub fn into_ring(self, node: Identifier) -> corelib::Error {
        corelib::Error::Remote {
            node,
            message: self.to_string(),
        }
    }
}
