//! Join protocol and finger-table maintenance.
//!
//! A joining node first builds its own finger table by asking an existing
//! member (the coordinator), splices itself in front of its successor, and
//! then walks backwards around the ring telling every node whose finger
//! should now point at it.
//!
//! Precondition: joins are strictly sequential. `update_finger_table`'s
//! backward propagation is not safe under overlapping joins, so whoever drives
//! the joins must serialize them.

use crate::error::Result;
use crate::network::{NodeRef, RingRpc};
use crate::node::RingNode;
use crate::trace::Trace;
use tracing::{debug, info};

impl RingNode {
    /// Full join: `init_finger_table` followed by `update_others`.
    pub async fn join<R: RingRpc + ?Sized>(&mut self, rpc: &R, bootstrap: &NodeRef) -> Result<()> {
        info!(id = %self.id(), bootstrap = %bootstrap, "joining ring");
        self.init_finger_table(rpc, bootstrap).await?;
        self.update_others(rpc).await?;
        info!(
            id = %self.id(),
            successor = %self.successor().id,
            predecessor = %self.predecessor().id,
            "joined ring"
        );
        Ok(())
    }

    /// Builds this node's finger table through `bootstrap` and inserts the
    /// node between its successor and that successor's old predecessor.
    pub async fn init_finger_table<R: RingRpc + ?Sized>(
        &mut self,
        rpc: &R,
        bootstrap: &NodeRef,
    ) -> Result<()> {
        let space = self.space();
        let me = *self.me();

        let start = space.finger_start(me.id, 1)?;
        let successor = rpc.find_successor(bootstrap, start, None).await?;
        self.set_finger(1, successor)?;

        let old = rpc.get_node(&successor).await?;
        self.set_predecessor(old.predecessor);
        rpc.set_predecessor(&successor, me).await?;

        for i in 1..space.bits() as usize {
            let start = space.finger_start(me.id, i + 1)?;
            let previous = self.fingers().get(i)?.node;

            let target = if space.in_closed_open(start, me.id, previous.id) {
                previous
            } else {
                let found = rpc.find_successor(bootstrap, start, None).await?;
                // The ring does not know about us yet; if the answer wrapped
                // past us, we are the real successor of `start`.
                if space.in_half_open(found.id, space.sub(start, 1), me.id) {
                    found
                } else {
                    me
                }
            };
            self.set_finger(i + 1, target)?;
        }

        debug!(id = %me.id, fingers = ?self.fingers().iter().map(|f| f.node.id.0).collect::<Vec<_>>(), "finger table initialised");
        Ok(())
    }

    /// Tells every node whose `index`-th finger should now be this node.
    pub async fn update_others<R: RingRpc + ?Sized>(&self, rpc: &R) -> Result<()> {
        let space = self.space();
        let me = *self.me();
        let engine = self.lookup(rpc);

        for index in 1..=space.bits() as usize {
            let key = space.add(space.sub(me.id, 1u64 << (index - 1)), 1);
            let mut trace = Trace::new();
            let predecessor = engine.find_predecessor(key, &mut trace).await?;
            if predecessor.id != me.id {
                rpc.update_finger_table(&predecessor, me, index).await?;
            }
        }
        Ok(())
    }

    /// Adopts `candidate` as finger `index` if it precedes the current entry,
    /// then forwards the update to this node's predecessor.
    ///
    /// Returns whether the local table changed.
    pub async fn update_finger_table<R: RingRpc + ?Sized>(
        &mut self,
        rpc: &R,
        candidate: NodeRef,
        index: usize,
    ) -> Result<bool> {
        let space = self.space();
        let current = self.fingers().get(index)?.node;
        if !space.in_closed_open(candidate.id, self.id(), current.id) {
            return Ok(false);
        }

        debug!(id = %self.id(), index, from = %current.id, to = %candidate.id, "finger updated");
        self.set_finger(index, candidate)?;

        let predecessor = *self.predecessor();
        if predecessor.id != candidate.id && predecessor.id != self.id() {
            rpc.update_finger_table(&predecessor, candidate, index).await?;
        }
        Ok(true)
    }
}
