//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process. Logs go to stderr so stdout stays
/// machine-readable; `RUST_LOG` overrides the default level.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}

/// Verbose mode raises both the library and the `ledger` binary to debug; the
/// binary reports command failures under its own target.
fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "ledger_service=debug,ledger=debug,warn"
    } else {
        "warn"
    }
}
