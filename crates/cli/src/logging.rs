//! Tracing subscriber setup for the `chord` binary.

use tracing_subscriber::EnvFilter;

/// Installs a stderr `fmt` subscriber at `level`.
///
/// `RUST_LOG`, when set, takes precedence over `level`. Calling this more
/// than once keeps the first subscriber.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(level, "logging initialized");
    }
}
