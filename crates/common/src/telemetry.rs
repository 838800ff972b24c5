//! Logging initialization for the Vantage engine.
//!
//! Sets up a `tracing` subscriber with env-filter support. Query audit logs
//! use `target: "queries"` so operators can route them separately.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber. Safe to call once per process;
/// subsequent calls are no-ops.
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
