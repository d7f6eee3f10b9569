//! Structured logging configuration.
//!
//! The engine itself only emits `tracing` events; this helper wires up a
//! subscriber for binaries and test harnesses. Filtering follows
//! `RUST_LOG` with an overridable default.

use tracing_subscriber::EnvFilter;

/// Install a global subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"swarmlink=info"`). Safe to call more than
/// once; later calls are no-ops.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
