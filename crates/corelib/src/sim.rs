//! In-process ring.
//!
//! [`LocalNetwork`] hosts many [`RingNode`]s in one process and implements
//! [`RingRpc`] by calling straight into the target node, so the real join and
//! lookup code runs without sockets. Each node sits behind its own async
//! mutex, which reproduces the one-request-at-a-time rule of a listening
//! member: a call that looped back into a busy node would hang, exactly as it
//! would on the wire.

use crate::error::{Error, Result};
use crate::network::{NodeRef, RingRpc};
use crate::node::{NodeSnapshot, RingNode};
use crate::ring::{Identifier, IdentifierSpace};
use crate::trace::Trace;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

type Shared = Arc<AsyncMutex<RingNode>>;

/// A whole ring living in one process.
pub struct LocalNetwork {
    space: IdentifierSpace,
    nodes: Mutex<HashMap<Identifier, Shared>>,
}

impl LocalNetwork {
    pub fn new(space: IdentifierSpace) -> Self {
        Self {
            space,
            nodes: Mutex::new(HashMap::new()),
        }
    }

    pub fn space(&self) -> IdentifierSpace {
        self.space
    }

    /// Synthetic address for `id`; routing only ever looks at the identifier.
    pub fn node_ref(&self, id: Identifier) -> NodeRef {
        let port = (id.0 % u16::MAX as u64) as u16;
        NodeRef::new(id, SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// Starts the ring with a single solitary member.
    pub fn bootstrap(&self, id: Identifier) -> NodeRef {
        let me = self.node_ref(id);
        self.insert(RingNode::solitary(me, self.space));
        me
    }

    /// Joins `id` through `via`. Joins must not overlap.
    pub async fn join(&self, id: Identifier, via: &NodeRef) -> Result<NodeRef> {
        let me = self.node_ref(id);
        let mut node = RingNode::solitary(me, self.space);
        node.join(self, via).await?;
        self.insert(node);
        Ok(me)
    }

    fn insert(&self, node: RingNode) {
        let id = node.id();
        self.lock_nodes().insert(id, Arc::new(AsyncMutex::new(node)));
    }

    fn lock_nodes(&self) -> std::sync::MutexGuard<'_, HashMap<Identifier, Shared>> {
        // The map is never held across an await, so poisoning means a test
        // already panicked.
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle(&self, id: Identifier) -> Result<Shared> {
        self.lock_nodes().get(&id).cloned().ok_or(Error::Remote {
            node: id,
            message: "unknown node".into(),
        })
    }

    /// Member identifiers, ascending.
    pub fn members(&self) -> Vec<Identifier> {
        let mut ids: Vec<Identifier> = self.lock_nodes().keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn snapshot(&self, id: Identifier) -> Result<NodeSnapshot> {
        let node = self.handle(id)?;
        let guard = node.lock().await;
        Ok(guard.snapshot())
    }

    /// Snapshots of every member, ascending by identifier.
    pub async fn snapshots(&self) -> Result<Vec<NodeSnapshot>> {
        let mut out = Vec::new();
        for id in self.members() {
            out.push(self.snapshot(id).await?);
        }
        Ok(out)
    }

    /// `find_successor(key)` started at member `origin`.
    pub async fn find_successor_from(
        &self,
        origin: Identifier,
        key: Identifier,
    ) -> Result<(NodeRef, Trace)> {
        let mut trace = Trace::new();
        let target = self.node_ref(origin);
        let node = self.find_successor(&target, key, Some(&mut trace)).await?;
        Ok((node, trace))
    }
}

#[async_trait]
impl RingRpc for LocalNetwork {
    async fn get_node(&self, target: &NodeRef) -> Result<NodeSnapshot> {
        self.snapshot(target.id).await
    }

    async fn find_successor(
        &self,
        target: &NodeRef,
        key: Identifier,
        trace: Option<&mut Trace>,
    ) -> Result<NodeRef> {
        let node = self.handle(target.id)?;
        let guard = node.lock().await;
        let mut hops = Trace::new();
        let found = guard.lookup(self).find_successor(key, &mut hops).await?;
        if let Some(trace) = trace {
            trace.extend(hops.into_vec());
        }
        Ok(found)
    }

    async fn find_predecessor(&self, target: &NodeRef, key: Identifier) -> Result<NodeRef> {
        let node = self.handle(target.id)?;
        let guard = node.lock().await;
        let mut hops = Trace::new();
        guard.lookup(self).find_predecessor(key, &mut hops).await
    }

    async fn closest_preceding_finger(&self, target: &NodeRef, key: Identifier) -> Result<NodeRef> {
        let node = self.handle(target.id)?;
        let guard = node.lock().await;
        Ok(guard.lookup(self).closest_preceding_finger(key))
    }

    async fn set_predecessor(&self, target: &NodeRef, predecessor: NodeRef) -> Result<()> {
        let node = self.handle(target.id)?;
        node.lock().await.set_predecessor(predecessor);
        Ok(())
    }

    async fn update_finger_table(
        &self,
        target: &NodeRef,
        candidate: NodeRef,
        index: usize,
    ) -> Result<()> {
        let node = self.handle(target.id)?;
        let mut guard = node.lock().await;
        guard.update_finger_table(self, candidate, index).await?;
        Ok(())
    }
}
