//! Diagnostic tracing for the interpreter.
//!
//! Events go to stderr so they never mix with the inventory written to
//! stdout. `RUST_LOG` takes precedence over the `-v` count when set.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Map the number of `-v` flags to a default filter directive.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize the tracing subscriber.
///
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=reconstructed=trace reconstructed run source.yml --inventory inv.json
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
