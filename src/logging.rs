//! Tracing initialization.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter when set. Logs go to stderr so
/// stdout stays clean for machine-readable output.
pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "regoforge=debug,info"
    } else {
        "regoforge=info,warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
