//! Process entry points: a lone member, the coordinator, or a whole ring in
//! one process.

use crate::bootstrap::Bootstrap;
use crate::config::RingConfig;
use crate::coordinator::CoordinatorService;
use crate::error::{NodeError, Result};
use crate::service::NodeService;
use corelib::{IdentifierSpace, NodeRef, Topology};
use std::net::SocketAddr;
use tokio::task::JoinSet;
use tracing::info;

/// Listens on `addr` as a member and waits to be told to join.
pub async fn run_member(addr: SocketAddr) -> Result<()> {
    NodeService::bind(addr).await?.serve().await
}

/// Runs the coordinator of `config` and bootstraps the configured members,
/// which must be started separately. Serves until the listener fails.
pub async fn run_coordinator(config: &RingConfig) -> Result<()> {
    config.validate()?;
    let server =
        CoordinatorService::bind(config.coordinator_addr(), config.coordinator_id(), config.space()?)
            .await?;
    let addr = server.local_addr()?;
    let listener = tokio::spawn(server.serve());

    Bootstrap::from_config(config, addr)
        .run(&mut config.allocator()?)
        .await?;

    listener.await.map_err(join_failure)?
}

/// Coordinator and every configured member, all listening inside this
/// process. Dropping it stops every listener.
pub struct LocalRing {
    space: IdentifierSpace,
    coordinator: NodeRef,
    members: Vec<NodeRef>,
    tasks: JoinSet<Result<()>>,
}

impl LocalRing {
    /// Binds the coordinator and every member of `config`, then bootstraps
    /// the ring. Port 0 in the configuration binds an ephemeral port.
    pub async fn launch(config: &RingConfig) -> Result<Self> {
        config.validate()?;
        let space = config.space()?;
        let mut tasks = JoinSet::new();

        let server =
            CoordinatorService::bind(config.coordinator_addr(), config.coordinator_id(), space)
                .await?;
        let coordinator = server.dispatcher().me()?;
        tasks.spawn(server.serve());

        let mut addrs = Vec::with_capacity(config.member_ports.len());
        for addr in config.member_addrs() {
            let server = NodeService::bind(addr).await?;
            addrs.push(server.local_addr()?);
            tasks.spawn(server.serve());
        }

        let members = Bootstrap::from_config(config, coordinator.addr)
            .with_members(addrs)
            .run(&mut config.allocator()?)
            .await?;
        info!(coordinator = %coordinator, members = members.len(), "local ring up");

        Ok(Self {
            space,
            coordinator,
            members,
            tasks,
        })
    }

    pub fn coordinator(&self) -> NodeRef {
        self.coordinator
    }

    /// Members in join order, coordinator excluded.
    pub fn members(&self) -> &[NodeRef] {
        &self.members
    }

    pub fn space(&self) -> IdentifierSpace {
        self.space
    }

    /// Expected shape of this ring.
    pub fn topology(&self) -> Topology {
        Topology::new(
            self.space,
            std::iter::once(self.coordinator.id).chain(self.members.iter().map(|m| m.id)),
        )
    }

    /// Waits until a listener stops, returning its error.
    pub async fn wait(mut self) -> Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            joined.map_err(join_failure)??;
        }
        Ok(())
    }
}

fn join_failure(e: tokio::task::JoinError) -> NodeError {
    NodeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}
