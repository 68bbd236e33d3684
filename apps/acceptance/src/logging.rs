//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured filter when it is set.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed (tests,
/// embedding). The existing one stays in place.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
    {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(error = %err, "tracing subscriber already installed");
            false
        }
    }
}
