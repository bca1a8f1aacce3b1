//! Ring bootstrap.
//!
//! The coordinator assigns every configured member a distinct identifier and
//! then tells the members to join, one at a time, waiting for each to finish
//! before contacting the next. `update_finger_table` propagation is only
//! correct when it observes a settled ring, so joins are never allowed to
//! overlap: every join goes through one shared lock.

use crate::config::RingConfig;
use crate::error::{NodeError, Result};
use corelib::{IdAllocator, NodeRef};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use transport::{Request, Response, RingParams, TcpRpc};

#[derive(Clone)]
pub struct Bootstrap {
    params: RingParams,
    members: Vec<SocketAddr>,
    rpc: TcpRpc,
    retries: u32,
    backoff: Duration,
    join_lock: Arc<Mutex<()>>,
}

impl Bootstrap {
    /// Joins `members`, in order, into the ring described by `params`.
    pub fn new(params: RingParams, members: Vec<SocketAddr>) -> Self {
        Self {
            params,
            members,
            rpc: TcpRpc::new(),
            retries: 1,
            backoff: Duration::ZERO,
            join_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Bootstrap for the members of `config`, coordinator listening on
    /// `coordinator`.
    pub fn from_config(config: &RingConfig, coordinator: SocketAddr) -> Self {
        Self::new(config.params(coordinator), config.member_addrs())
            .with_retry(config.join_retries, config.join_backoff())
    }

    /// Retries connecting to a member that is not listening yet.
    pub fn with_retry(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries.max(1);
        self.backoff = backoff;
        self
    }

    pub fn with_members(mut self, members: Vec<SocketAddr>) -> Self {
        self.members = members;
        self
    }

    pub fn params(&self) -> &RingParams {
        &self.params
    }

    /// Identifier for every member, in member order.
    ///
    /// The coordinator's identifier is reserved first so no member can take
    /// it. Members are keyed by `"<ip><port>"`.
    pub fn assign_ids(&self, allocator: &mut IdAllocator) -> Result<Vec<NodeRef>> {
        let coordinator = self.params.coordinator.id;
        if !allocator.is_used(coordinator) {
            allocator.reserve(coordinator)?;
        }
        self.members
            .iter()
            .map(|addr| {
                let id = allocator.allocate(&format!("{}{}", addr.ip(), addr.port()))?;
                Ok(NodeRef::new(id, *addr))
            })
            .collect()
    }

    /// Assigns identifiers and joins every member in order. A failed join
    /// aborts the run; later joins would see an inconsistent ring.
    pub async fn run(&self, allocator: &mut IdAllocator) -> Result<Vec<NodeRef>> {
        let members = self.assign_ids(allocator)?;
        info!(
            coordinator = %self.params.coordinator,
            members = members.len(),
            "bootstrapping ring"
        );
        for member in &members {
            self.join(member).await?;
        }
        info!(members = members.len(), "ring bootstrapped");
        Ok(members)
    }

    /// Sends JOIN to `member` and waits for it to finish joining.
    pub async fn join(&self, member: &NodeRef) -> Result<()> {
        let _guard = self.join_lock.lock().await;
        let request = Request::Join {
            id: member.id,
            params: self.params,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.rpc.call(member.addr, &request).await {
                Ok(Response::Ok) => {
                    info!(member = %member, "member joined");
                    return Ok(());
                }
                Ok(Response::Err(reason)) => {
                    return Err(NodeError::JoinRejected {
                        addr: member.addr,
                        reason,
                    })
                }
                Ok(other) => {
                    return Err(NodeError::JoinRejected {
                        addr: member.addr,
                        reason: format!("unexpected {} response", other.kind()),
                    })
                }
                Err(e) if e.is_refused() && attempt < self.retries => {
                    debug!(member = %member, attempt, "member not listening yet");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) if e.is_refused() => {
                    warn!(member = %member, attempts = attempt, "giving up on member");
                    return Err(NodeError::MemberUnavailable {
                        addr: member.addr,
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
