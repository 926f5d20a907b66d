//! Logging setup for the catalog binary and tests.

use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`
pub const LOG_ENV: &str = "MEDIA_CATALOG_LOG";

/// Install the global tracing subscriber.
///
/// The filter comes from `MEDIA_CATALOG_LOG`, then `RUST_LOG`, then falls back
/// to `info` (`debug` when `verbose`). Calling this twice is harmless.
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };

    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
