//! Core library for the Chord ring.
//!
//! This crate holds everything about the ring that does not touch a socket:
//! - Identifier space arithmetic and interval tests
//! - Partitioners (key hashing) and collision-free identifier assignment
//! - Finger tables and per-node state
//! - The lookup and join algorithms, written against the [`RingRpc`] seam
//! - A reference [`Topology`] to check a live ring against
//!
//! The transport crate plugs a TCP implementation into [`RingRpc`]; the
//! [`sim`] module provides an in-process one.

pub mod allocator;
pub mod error;
pub mod finger;
pub mod join;
pub mod lookup;
pub mod network;
pub mod node;
pub mod partitioner;
pub mod ring;
pub mod sim;
pub mod trace;

pub use allocator::IdAllocator;
pub use error::{Error, Result};
pub use finger::{Finger, FingerTable};
pub use lookup::LookupEngine;
pub use network::{NodeRef, RingRpc};
pub use node::{NodeSnapshot, RingNode};
pub use partitioner::{HashAlgorithm, Partitioner};
pub use ring::topology::Violation;
pub use ring::{Identifier, IdentifierSpace, Topology};
pub use trace::Trace;
