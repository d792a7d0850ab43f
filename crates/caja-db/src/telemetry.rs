//! # Tracing Setup
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=caja=trace` - Show trace for caja crates only
//! - Default: `info,caja=debug,sqlx=warn`

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,caja=debug,sqlx=warn";

/// Installs the global `fmt` subscriber. Binaries call this once at startup;
/// libraries and tests never do.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
