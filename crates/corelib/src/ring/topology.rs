//! Expected shape of a converged ring.
//!
//! Given the full membership, [`Topology`] answers what every node's
//! successor, predecessor and finger table should be, and who owns each key.
//! It is the reference the live ring is checked against.

use crate::node::NodeSnapshot;
use crate::ring::{Identifier, IdentifierSpace};
use std::collections::BTreeSet;

/// The sorted member set of one ring.
#[derive(Clone, Debug)]
pub struct Topology {
    space: IdentifierSpace,
    members: BTreeSet<Identifier>,
}

/// A way a live node deviates from the expected topology.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("member {0} did not report")]
    Missing(Identifier),
    #[error("node {0} is not a known member")]
    Unknown(Identifier),
    #[error("node {node}: successor is {actual}, expected {expected}")]
    Successor {
        node: Identifier,
        actual: Identifier,
        expected: Identifier,
    },
    #[error("node {node}: predecessor is {actual}, expected {expected}")]
    Predecessor {
        node: Identifier,
        actual: Identifier,
        expected: Identifier,
    },
    #[error("node {node}: finger {index} (start {start}) is {actual}, expected {expected}")]
    Finger {
        node: Identifier,
        index: usize,
        start: Identifier,
        actual: Identifier,
        expected: Identifier,
    },
}

impl Topology {
    pub fn new<I: IntoIterator<Item = Identifier>>(space: IdentifierSpace, members: I) -> Self {
        Self {
            space,
            members: members.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in ascending identifier order.
    pub fn members(&self) -> impl Iterator<Item = Identifier> + '_ {
        self.members.iter().copied()
    }

    /// First member at or after `key`, wrapping.
    pub fn successor_of(&self, key: Identifier) -> Option<Identifier> {
        self.members
            .range(key..)
            .next()
            .or_else(|| self.members.iter().next())
            .copied()
    }

    /// Member owning `key`.
    pub fn owner_of(&self, key: Identifier) -> Option<Identifier> {
        self.successor_of(key)
    }

    /// The member after `member` in ring order.
    pub fn next_member(&self, member: Identifier) -> Option<Identifier> {
        self.successor_of(self.space.add(member, 1))
    }

    /// The member before `member` in ring order.
    pub fn previous_member(&self, member: Identifier) -> Option<Identifier> {
        self.members
            .range(..member)
            .next_back()
            .or_else(|| self.members.iter().next_back())
            .copied()
    }

    /// `(start, node)` for every finger of `member`, index 1 first.
    pub fn expected_fingers(&self, member: Identifier) -> Vec<(Identifier, Identifier)> {
        (0..self.space.bits())
            .filter_map(|i| {
                let start = self.space.add(member, 1u64 << i);
                self.successor_of(start).map(|node| (start, node))
            })
            .collect()
    }

    /// Checks reported node records against the expected ring.
    pub fn verify(&self, reports: &[NodeSnapshot]) -> Vec<Violation> {
        let mut violations = Vec::new();
        let reported: BTreeSet<Identifier> = reports.iter().map(|r| r.node.id).collect();

        for member in self.members() {
            if !reported.contains(&member) {
                violations.push(Violation::Missing(member));
            }
        }

        for report in reports {
            let id = report.node.id;
            if !self.members.contains(&id) {
                violations.push(Violation::Unknown(id));
                continue;
            }
            if let Some(expected) = self.next_member(id) {
                if report.successor.id != expected {
                    violations.push(Violation::Successor {
                        node: id,
                        actual: report.successor.id,
                        expected,
                    });
                }
            }
            if let Some(expected) = self.previous_member(id) {
                if report.predecessor.id != expected {
                    violations.push(Violation::Predecessor {
                        node: id,
                        actual: report.predecessor.id,
                        expected,
                    });
                }
            }
            for (index, (finger, (start, expected))) in report
                .fingers
                .iter()
                .zip(self.expected_fingers(id))
                .enumerate()
            {
                if finger.node.id != expected {
                    violations.push(Violation::Finger {
                        node: id,
                        index: index + 1,
                        start,
                        actual: finger.node.id,
                        expected,
                    });
                }
            }
        }
        violations
    }
}
