//! Client library and operator tool for the Chord ring.
//!
//! Provides:
//! - `Client`: publish, subscribe and topology dump against a coordinator
//! - `TagRegistry`: stable, collision-free tag identifiers, saved between runs
//! - `Query`: AND / OR subscribe expressions
//! - The `chord` command line (members, coordinator, local ring, client)

pub mod client;
pub mod commands;
pub mod config;
pub mod logging;
pub mod query;
pub mod registry;

pub use client::{Client, ClientError};
pub use commands::{Command, CommandResult};
pub use config::CliConfig;
pub use query::{Operator, Query, QueryError};
pub use registry::{RegistryError, TagRegistry};
