//! Logging initialisation.
//!
//! Logs go to stderr through a `tracing-subscriber` fmt layer. The filter is
//! read from `VMRIG_LOG`, then `RUST_LOG`, and falls back to `warn`.

use crate::constants::{DEFAULT_LOG_FILTER, LOG_ENV_VAR};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber.
///
/// Returns `false` if a global subscriber was already installed (by an
/// earlier call or by the embedding application), which is not an error.
pub fn try_init() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

/// Installs the global subscriber, ignoring an already installed one.
pub fn init() {
    if !try_init() {
        tracing::debug!("global tracing subscriber already installed");
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
