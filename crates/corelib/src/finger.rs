//! Finger table storage.
//!
//! Entry `i` (1-based) covers the offset `2^(i-1)` from the owning node and
//! points at the first member at or after that offset. Entry 1 is, by
//! definition, the successor.

use crate::error::{Error, Result};
use crate::network::NodeRef;
use crate::ring::{Identifier, IdentifierSpace};
use serde::{Deserialize, Serialize};

/// One finger-table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finger {
    pub start: Identifier,
    pub node: NodeRef,
}

/// The M routing entries of one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FingerTable {
    fingers: Vec<Finger>,
}

impl FingerTable {
    /// Table of a node alone on the ring: every finger points back at it.
    pub fn solitary(space: IdentifierSpace, owner: NodeRef) -> Self {
        let fingers = (1..=space.bits() as usize)
            .map(|i| Finger {
                start: space.add(owner.id, 1u64 << (i - 1)),
                node: owner,
            })
            .collect();
        Self { fingers }
    }

    /// Number of entries (M).
    pub fn len(&self) -> usize {
        self.fingers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingers.is_empty()
    }

    /// Entry `index` (1-based).
    pub fn get(&self, index: usize) -> Result<&Finger> {
        index
            .checked_sub(1)
            .and_then(|i| self.fingers.get(i))
            .ok_or(Error::FingerIndex {
                index,
                bits: self.fingers.len() as u32,
            })
    }

    /// Repoints entry `index` (1-based) at `node`; the start never changes.
    pub fn set_node(&mut self, index: usize, node: NodeRef) -> Result<()> {
        let bits = self.fingers.len() as u32;
        let finger = index
            .checked_sub(1)
            .and_then(|i| self.fingers.get_mut(i))
            .ok_or(Error::FingerIndex { index, bits })?;
        finger.node = node;
        Ok(())
    }

    /// The successor (entry 1).
    pub fn successor(&self) -> &NodeRef {
        // Construction always yields at least one finger.
        &self.fingers[0].node
    }

    /// Entries from 1 to M.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Finger> {
        self.fingers.iter()
    }

    pub fn to_vec(&self) -> Vec<Finger> {
        self.fingers.clone()
    }
}
