//! Tracing setup shared by the liftplan binaries.
//!
//! Logs go to stderr; stdout carries command output only.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` when set, otherwise `default_level`
fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the subscriber at INFO unless `RUST_LOG` says otherwise
pub fn init() {
    init_with_level("info")
}

/// Install the subscriber with a custom default level (debug, info, warn, error)
pub fn init_with_level(default_level: &str) {
    tracing_subscriber::registry()
        .with(filter(default_level))
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Debug-level logs routed through the test harness; safe to call repeatedly
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
