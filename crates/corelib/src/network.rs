//! Core networking abstractions shared across the workspace.
//!
//! Nodes never hold references to each other. A peer is named by a
//! [`NodeRef`] (identifier plus listen address) and is only turned into a
//! connection when one of the [`RingRpc`] calls is issued.

use crate::error::Result;
use crate::node::NodeSnapshot;
use crate::ring::Identifier;
use crate::trace::Trace;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Lightweight identity handle for a ring member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: Identifier,
    pub addr: SocketAddr,
}

impl NodeRef {
    pub fn new(id: Identifier, addr: SocketAddr) -> Self {
        Self { id, addr }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

/// Remote operations one ring member issues against another.
///
/// Every call blocks the caller until the peer answers. Implementations must
/// never be asked to call the local node; callers short-circuit on
/// `target.id == self.id` and use the local state instead.
#[async_trait]
pub trait RingRpc: Send + Sync {
    /// GET NODE: the peer's full record.
    async fn get_node(&self, target: &NodeRef) -> Result<NodeSnapshot>;

    /// FIND SUCC: the peer resolves `successor(key)`. Hops it visited are
    /// appended to `trace` when one is given.
    async fn find_successor(
        &self,
        target: &NodeRef,
        key: Identifier,
        trace: Option<&mut Trace>,
    ) -> Result<NodeRef>;

    /// FIND PRED: the peer resolves `predecessor(key)`.
    async fn find_predecessor(&self, target: &NodeRef, key: Identifier) -> Result<NodeRef>;

    /// CLOSEST PRE FINGER: the peer's finger most closely preceding `key`.
    async fn closest_preceding_finger(&self, target: &NodeRef, key: Identifier)
        -> Result<NodeRef>;

    /// SET PRED: one-way; returns once the request is written.
    async fn set_predecessor(&self, target: &NodeRef, predecessor: NodeRef) -> Result<()>;

    /// UPDATE FINGER TABLE: returns once the peer (and everything it forwarded
    /// to) has applied the update.
    async fn update_finger_table(
        &self,
        target: &NodeRef,
        candidate: NodeRef,
        index: usize,
    ) -> Result<()>;
}
