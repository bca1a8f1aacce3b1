//! Error types for listening services.

use std::net::SocketAddr;
use transport::TransportError;

/// Result type alias for the node crate.
pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Ring(#[from] corelib::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed configuration file: {0}")]
    ConfigFormat(#[from] toml::de::Error),

    /// Ring command received before this member joined.
    #[error("not joined")]
    NotJoined,

    #[error("already joined as node {0}")]
    AlreadyJoined(corelib::Identifier),

    #[error("member {addr} rejected join: {reason}")]
    JoinRejected { addr: SocketAddr, reason: String },

    #[error("member {addr} did not answer after {attempts} attempts")]
    MemberUnavailable { addr: SocketAddr, attempts: u32 },
}
