//! Logging configuration

use ciphermatch_types::{CiphermatchError, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `level` when set. With `json` every event is one
/// JSON object per line.
///
/// # Errors
/// Returns `Configuration` if a global subscriber is already installed.
pub fn init(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = if json {
        subscriber.with(fmt::layer().json()).try_init()
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init()
    };
    installed.map_err(|e| CiphermatchError::Configuration(format!("failed to init logging: {e}")))
}
