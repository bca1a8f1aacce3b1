//! Successor / predecessor lookup.
//!
//! `find_predecessor` walks the ring towards the key, asking each candidate
//! for the finger that most closely precedes it. Finger offsets are powers of
//! two, so the remaining distance roughly halves with each hop and a lookup
//! finishes in at most M hops on a converged ring.

use crate::error::{Error, Result};
use crate::network::{NodeRef, RingRpc};
use crate::node::RingNode;
use crate::ring::Identifier;
use crate::trace::Trace;
use tracing::{debug, warn};

/// Lookup over one node's local state, reaching peers through `rpc`.
pub struct LookupEngine<'a, R: RingRpc + ?Sized> {
    node: &'a RingNode,
    rpc: &'a R,
}

impl<'a, R: RingRpc + ?Sized> LookupEngine<'a, R> {
    pub fn new(node: &'a RingNode, rpc: &'a R) -> Self {
        Self { node, rpc }
    }

    /// Highest finger whose node lies strictly between this node and `key`,
    /// or this node when none does. Purely local.
    pub fn closest_preceding_finger(&self, key: Identifier) -> NodeRef {
        let space = self.node.space();
        let me = self.node.id();
        self.node
            .fingers()
            .iter()
            .rev()
            .find(|finger| space.in_open(finger.node.id, me, key))
            .map(|finger| finger.node)
            .unwrap_or(*self.node.me())
    }

    /// The member `p` with `key` in `(p, successor(p)]`.
    pub async fn find_predecessor(&self, key: Identifier, trace: &mut Trace) -> Result<NodeRef> {
        let (predecessor, _) = self.locate(key, trace).await?;
        Ok(predecessor)
    }

    /// The member owning `key`: the first one at or after it.
    pub async fn find_successor(&self, key: Identifier, trace: &mut Trace) -> Result<NodeRef> {
        trace.record(self.node.id());
        let (_, successor) = self.locate(key, trace).await?;
        Ok(successor)
    }

    /// Walks to the predecessor of `key`, returning it with its successor.
    async fn locate(&self, key: Identifier, trace: &mut Trace) -> Result<(NodeRef, NodeRef)> {
        let space = self.node.space();
        let me = *self.node.me();
        let mut candidate = me;
        let mut successor = *self.node.successor();
        let mut hops: u64 = 0;

        while !space.in_half_open(key, candidate.id, successor.id) {
            let next = if candidate.id == me.id {
                self.closest_preceding_finger(key)
            } else {
                self.rpc.closest_preceding_finger(&candidate, key).await?
            };

            if next.id == candidate.id {
                // A stale successor pointer can leave no finger in between.
                // Settle on the candidate rather than spinning.
                warn!(
                    key = %key,
                    candidate = %candidate.id,
                    successor = %successor.id,
                    "no finger precedes key, settling on current candidate"
                );
                break;
            }

            hops += 1;
            if hops > space.size() {
                return Err(Error::LookupDiverged { key, hops });
            }

            successor = if next.id == me.id {
                *self.node.successor()
            } else {
                trace.record(next.id);
                self.rpc.get_node(&next).await?.successor
            };
            candidate = next;
        }

        debug!(key = %key, predecessor = %candidate.id, successor = %successor.id, hops, "lookup resolved");
        Ok((candidate, successor))
    }
}

impl RingNode {
    /// Lookup engine over this node's state.
    pub fn lookup<'a, R: RingRpc + ?Sized>(&'a self, rpc: &'a R) -> LookupEngine<'a, R> {
        LookupEngine::new(self, rpc)
    }
}
