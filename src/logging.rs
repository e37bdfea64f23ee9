//! Tracing setup for the `xcdiag` binary

use tracing_subscriber::EnvFilter;

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (the configured
/// `logging.level`) applies. Only the first call in a process takes effect.
pub fn init_tracing(default_level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { default_level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}
