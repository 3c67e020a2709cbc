//! Log output for the `windh` binary.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "wind_harvest=info,windh=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Events go to stderr so command output on stdout stays machine-readable.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
