//! Listening ring members.
//!
//! This crate turns the ring logic of `corelib` into running processes:
//! - `NodeService`: one member's sequential request dispatcher
//! - `CoordinatorService`: the well-known member that also routes client
//!   publish / subscribe traffic
//! - `Bootstrap`: identifier assignment and the sequential join driver
//! - `RingConfig`: deployment parameters loaded from TOML

pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod launch;
pub mod server;
pub mod service;

pub use bootstrap::Bootstrap;
pub use config::RingConfig;
pub use coordinator::CoordinatorService;
pub use error::{NodeError, Result};
pub use launch::{run_coordinator, run_member, LocalRing};
pub use server::{Dispatch, Server};
pub use service::NodeService;
