//! Error types for the core library.

use crate::ring::Identifier;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Ring modulus outside the supported range.
    #[error("invalid identifier space: {0}")]
    InvalidSpace(String),
    /// Finger index outside `1..=M`.
    #[error("finger index {index} out of range 1..={bits}")]
    FingerIndex { index: usize, bits: u32 },
    /// Every identifier of the ring is already taken.
    #[error("identifier space exhausted ({size} slots in use)")]
    SpaceExhausted { size: u64 },
    /// Identifier already reserved by someone else.
    #[error("identifier {0} already in use")]
    IdentifierTaken(Identifier),
    /// Key already holds a different identifier.
    #[error("key {key:?} already holds identifier {id}")]
    KeyAssigned { key: String, id: Identifier },
    /// `find_predecessor` did not converge within the hop budget.
    #[error("lookup for key {key} diverged after {hops} hops")]
    LookupDiverged { key: Identifier, hops: u64 },
    /// A remote call failed; the message comes from the transport.
    #[error("remote call to node {node} failed: {message}")]
    Remote { node: Identifier, message: String },
}
