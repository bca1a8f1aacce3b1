//! CLI entry point for the `chord` tool.

use clap::Parser;
use cli::CliConfig;

fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    config.run()
}
