//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::GovernanceError;

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), GovernanceError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| logging.level.clone().into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match (logging.json, logging.timestamps) {
        (true, true) => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        (true, false) => registry
            .with(tracing_subscriber::fmt::layer().json().without_time())
            .try_init(),
        (false, true) => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        (false, false) => registry
            .with(tracing_subscriber::fmt::layer().without_time())
            .try_init(),
    };
    result.map_err(|e| GovernanceError::Telemetry(e.to_string()))
}
