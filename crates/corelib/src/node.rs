//! Ring member state.
//!
//! A [`RingNode`] is the data record one member owns: its identifier, finger
//! table, predecessor and the tag entries it is responsible for. It is mutated
//! only by the service that hosts it.

use crate::error::Result;
use crate::finger::{Finger, FingerTable};
use crate::network::NodeRef;
use crate::ring::{Identifier, IdentifierSpace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Full record of one member, as returned by GET NODE and PRINT DATA.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node: NodeRef,
    pub successor: NodeRef,
    pub predecessor: NodeRef,
    pub fingers: Vec<Finger>,
    pub entry_count: usize,
}

/// Local state of one ring member.
#[derive(Clone, Debug)]
pub struct RingNode {
    me: NodeRef,
    space: IdentifierSpace,
    fingers: FingerTable,
    predecessor: NodeRef,
    entries: HashMap<Identifier, Vec<String>>,
}

impl RingNode {
    /// A node that is the only member of its ring: it is its own successor,
    /// predecessor and every finger.
    pub fn solitary(me: NodeRef, space: IdentifierSpace) -> Self {
        Self {
            me,
            space,
            fingers: FingerTable::solitary(space, me),
            predecessor: me,
            entries: HashMap::new(),
        }
    }

    pub fn id(&self) -> Identifier {
        self.me.id
    }

    pub fn me(&self) -> &NodeRef {
        &self.me
    }

    pub fn space(&self) -> IdentifierSpace {
        self.space
    }

    pub fn fingers(&self) -> &FingerTable {
        &self.fingers
    }

    pub fn successor(&self) -> &NodeRef {
        self.fingers.successor()
    }

    pub fn predecessor(&self) -> &NodeRef {
        &self.predecessor
    }

    pub fn set_predecessor(&mut self, predecessor: NodeRef) {
        self.predecessor = predecessor;
    }

    /// Repoints finger `index` (1-based).
    pub fn set_finger(&mut self, index: usize, node: NodeRef) -> Result<()> {
        self.fingers.set_node(index, node)
    }

    /// True if `key` falls on this node's arc `(predecessor, id]`.
    pub fn owns(&self, key: Identifier) -> bool {
        self.space.in_half_open(key, self.predecessor.id, self.me.id)
    }

    /// Stores `urls` under `tag`, replacing any earlier publish.
    pub fn publish(&mut self, tag: Identifier, urls: Vec<String>) -> Option<Vec<String>> {
        self.entries.insert(tag, urls)
    }

    /// URLs stored under `tag`, if any were published.
    pub fn lookup_entries(&self, tag: Identifier) -> Option<&[String]> {
        self.entries.get(&tag).map(Vec::as_slice)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            node: self.me,
            successor: *self.successor(),
            predecessor: self.predecessor,
            fingers: self.fingers.to_vec(),
            entry_count: self.entries.len(),
        }
    }
}
