//! Tracing subscriber setup for hosts embedding curator.

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber.
///
/// Respects `RUST_LOG` if set, otherwise logs curator at `debug` (or `trace`
/// when `verbose`). Calling this more than once is harmless; later calls are
/// ignored.
pub fn init(verbose: bool) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "curator=trace,curator_common=debug".to_string()
        } else {
            "curator=debug,curator_common=info".to_string()
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .try_init();
}

/// Install a subscriber that writes through the test harness capture.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("curator=debug"))
        .with_test_writer()
        .try_init();
}
