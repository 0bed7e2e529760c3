//! Tracing setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber: `RUST_LOG` if set, else `fallback`.
///
/// Returns false if a subscriber was already installed; calling it twice is
/// harmless.
pub fn init(fallback: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
