//! Tracing initialization for embedding processes.
//!
//! The crate itself only emits `tracing` events; hosts call [`init`]
//! once at startup (or install their own subscriber) to see them.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "lernia=info";

/// Install a fmt subscriber honoring `RUST_LOG`. Safe to call more than
/// once; later calls are no-ops.
pub fn init() {
    init_with_filter(DEFAULT_LOG_FILTER);
}

/// Install a fmt subscriber with an explicit fallback filter.
pub fn init_with_filter(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
