//! Logging setup, grounded in the teacher's `infra-common::logging::setup`:
//! an `EnvFilter`-driven `tracing_subscriber` with a caller-supplied default
//! level, overridable via `RUST_LOG`.

use tracing_subscriber::EnvFilter;

pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
