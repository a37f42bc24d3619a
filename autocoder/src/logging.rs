//! Tracing setup for the autocoder binary.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Stage progress and diagnostics via `RUST_LOG`,
//!   output to stderr. Not persisted.
//!
//! - **Run summary (`io/run_log`)**: Product artifact written next to the
//!   generated code. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` if unset, since stage progress is the
/// only feedback during a long run.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=autocoder=debug autocoder run --project calc --goal "..."
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
