//! Top-level command line configuration.

use crate::commands::Command;
use crate::logging;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "chord",
    version,
    about = "Chord ring with tag -> URL publish/subscribe"
)]
pub struct CliConfig {
    /// Log filter (`error`, `warn`, `info`, `debug`, `trace` or a full
    /// directive). Defaults to the ring configuration's `log_level`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Loads the ring configuration, installs logging and runs the command
    /// on a fresh multi-threaded runtime.
    pub fn run(self) -> anyhow::Result<()> {
        let ring = self.command.ring_config()?;
        logging::init(self.log_level.as_deref().unwrap_or(&ring.log_level));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.command.execute(&ring))
    }
}
