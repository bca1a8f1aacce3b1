//! Ring deployment configuration.
//!
//! Everything an operator fixes before the ring starts: the modulus, where
//! the coordinator and members listen, and how identifiers are hashed. The
//! coordinator reads it at startup; members receive the parts they need in
//! the JOIN request.

use crate::error::{NodeError, Result};
use corelib::{HashAlgorithm, IdAllocator, Identifier, IdentifierSpace, NodeRef};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use transport::RingParams;

/// Ports of the classic nine-member deployment.
pub const DEFAULT_MEMBER_PORTS: [u16; 9] =
    [55356, 55350, 5358, 5359, 5360, 5361, 5362, 5363, 5364];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Ring modulus exponent M.
    pub bits: u32,
    /// Address every process binds and advertises.
    pub host: IpAddr,
    pub coordinator_port: u16,
    /// Member ports, in join order. Port 0 binds an ephemeral port.
    pub member_ports: Vec<u16>,
    /// Well-known coordinator identifier.
    pub coordinator_id: u64,
    /// Upper bound on ring size, coordinator included.
    pub max_members: usize,
    pub hash: HashAlgorithm,
    /// Attempts per member before the bootstrap gives up on it.
    pub join_retries: u32,
    pub join_backoff_ms: u64,
    pub log_level: String,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            bits: 6,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            coordinator_port: 5370,
            member_ports: DEFAULT_MEMBER_PORTS.to_vec(),
            coordinator_id: 1,
            max_members: 10,
            hash: HashAlgorithm::default(),
            join_retries: 50,
            join_backoff_ms: 100,
            log_level: "info".to_string(),
        }
    }
}

impl RingConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RingConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let space = self.space()?;

        if !space.contains(Identifier(self.coordinator_id)) {
            return Err(NodeError::Config(format!(
                "coordinator_id {} outside ring of size {}",
                self.coordinator_id,
                space.size()
            )));
        }

        let total = self.member_ports.len() + 1;
        if total > self.max_members {
            return Err(NodeError::Config(format!(
                "{} members configured, max_members is {}",
                total, self.max_members
            )));
        }
        if self.max_members as u64 > space.size() {
            return Err(NodeError::Config(format!(
                "max_members {} exceeds ring size {}",
                self.max_members,
                space.size()
            )));
        }

        let mut seen = HashSet::new();
        for port in std::iter::once(self.coordinator_port).chain(self.member_ports.iter().copied()) {
            if port != 0 && !seen.insert(port) {
                return Err(NodeError::Config(format!("port {} configured twice", port)));
            }
        }
        Ok(())
    }

    pub fn space(&self) -> Result<IdentifierSpace> {
        IdentifierSpace::new(self.bits).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn coordinator_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.coordinator_port)
    }

    pub fn member_addrs(&self) -> Vec<SocketAddr> {
        self.member_ports
            .iter()
            .map(|port| SocketAddr::new(self.host, *port))
            .collect()
    }

    pub fn coordinator_id(&self) -> Identifier {
        Identifier(self.coordinator_id)
    }

    /// Ring parameters for a coordinator listening on `coordinator`.
    pub fn params(&self, coordinator: SocketAddr) -> RingParams {
        RingParams {
            bits: self.bits,
            coordinator: NodeRef::new(self.coordinator_id(), coordinator),
        }
    }

    /// Fresh allocator with this ring's space and hash.
    pub fn allocator(&self) -> Result<IdAllocator> {
        Ok(IdAllocator::new(self.space()?, self.hash.partitioner()))
    }

    pub fn join_backoff(&self) -> Duration {
        Duration::from_millis(self.join_backoff_ms)
    }
}
