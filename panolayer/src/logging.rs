//! Logging infrastructure for PanoLayer.
//!
//! Structured console logging with single-line compact format,
//! configurable via the `RUST_LOG` environment variable (defaults to
//! `info`). The engine itself only emits `tracing` events; calling this is
//! optional and embedders with their own subscriber should skip it.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging() -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()
}
