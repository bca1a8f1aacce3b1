//! Chord identifier ring.
//!
//! The ring manages identifier arithmetic and provides the expected
//! topology of a converged membership for verification.

pub mod space;
pub mod topology;

pub use space::{Identifier, IdentifierSpace, MAX_BITS};
pub use topology::Topology;
