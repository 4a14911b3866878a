//! Process-wide `tracing` subscriber.

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber once. `RUST_LOG` overrides `filter`.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// Calling this twice is harmless.
pub fn init(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
