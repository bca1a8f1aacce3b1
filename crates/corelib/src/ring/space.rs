//! Identifier space implementation.
//!
//! Every member and every tag sits on a ring of `2^M` slots. This module owns
//! the modular arithmetic over that ring and the single containment primitive
//! everything else is built from.

use crate::error::{Error, Result};
use crate::partitioner::Partitioner;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest supported ring modulus exponent.
pub const MAX_BITS: u32 = 63;

/// A position on the identifier ring, always in `[0, 2^M)`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Identifier(pub u64);

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Identifier {
    fn from(raw: u64) -> Self {
        Identifier(raw)
    }
}

/// Modular arithmetic over a ring of `2^bits` identifiers.
///
/// Fixed at deploy time; every member of one ring must agree on it.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct IdentifierSpace {
    bits: u32,
}

impl IdentifierSpace {
    /// Creates a space of `2^bits` identifiers.
    pub fn new(bits: u32) -> Result<Self> {
        if bits == 0 || bits > MAX_BITS {
            return Err(Error::InvalidSpace(format!(
                "bits must be in 1..={}, got {}",
                MAX_BITS, bits
            )));
        }
        Ok(Self { bits })
    }

    /// The exponent M; also the number of fingers per node.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of slots on the ring.
    pub fn size(&self) -> u64 {
        1u64 << self.bits
    }

    #[inline]
    fn mask(&self) -> u64 {
        self.size() - 1
    }

    /// Reduces an arbitrary value onto the ring.
    #[inline]
    pub fn wrap(&self, raw: u64) -> Identifier {
        Identifier(raw & self.mask())
    }

    /// True if `id` is a valid slot of this ring.
    pub fn contains(&self, id: Identifier) -> bool {
        id.0 < self.size()
    }

    /// `(id + offset) mod 2^M`.
    #[inline]
    pub fn add(&self, id: Identifier, offset: u64) -> Identifier {
        self.wrap(id.0.wrapping_add(offset))
    }

    /// `(id - offset) mod 2^M`.
    #[inline]
    pub fn sub(&self, id: Identifier, offset: u64) -> Identifier {
        self.wrap(id.0.wrapping_sub(offset))
    }

    /// Start of finger `index` (1-based): `(id + 2^(index-1)) mod 2^M`.
    pub fn finger_start(&self, id: Identifier, index: usize) -> Result<Identifier> {
        self.check_finger(index)?;
        Ok(self.add(id, 1u64 << (index - 1)))
    }

    pub(crate) fn check_finger(&self, index: usize) -> Result<()> {
        if index == 0 || index > self.bits as usize {
            return Err(Error::FingerIndex {
                index,
                bits: self.bits,
            });
        }
        Ok(())
    }

    /// True if `x` lies on the clockwise arc `(from, to]`.
    ///
    /// `from == to` denotes the whole ring. All other containment tests are
    /// derived from this one so wraparound is handled in exactly one place.
    pub fn in_half_open(&self, x: Identifier, from: Identifier, to: Identifier) -> bool {
        if from == to {
            return true;
        }
        if from < to {
            from < x && x <= to
        } else {
            x > from || x <= to
        }
    }

    /// True if `x` lies strictly between `from` and `to`.
    pub fn in_open(&self, x: Identifier, from: Identifier, to: Identifier) -> bool {
        x != to && self.in_half_open(x, from, to)
    }

    /// True if `x` lies on `[from, to)`; `from == to` is the whole ring.
    pub fn in_closed_open(&self, x: Identifier, from: Identifier, to: Identifier) -> bool {
        self.in_half_open(x, self.sub(from, 1), self.sub(to, 1))
    }

    /// Hashes an opaque key onto the ring. Collisions are the caller's problem.
    pub fn hash<P: Partitioner + ?Sized>(&self, partitioner: &P, key: &[u8]) -> Identifier {
        self.wrap(partitioner.digest(key))
    }
}
