//! Tracing subscriber setup

use std::io;

use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{ConfigError, LoggingConfig};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Returns `false` when a
/// subscriber was already installed, which is not an error.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| ConfigError::InvalidValue {
            field: "logging.level".to_string(),
            value: config.level.clone(),
            expected: format!("a tracing filter directive ({})", e),
        })?,
    };

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout).json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout))
            .try_init()
    };

    match installed {
        Ok(()) => {
            tracing::info!(
                target: "studbook::telemetry",
                "Tracing initialized (level: {}, format: {})",
                config.level,
                if config.json { "JSON" } else { "text" }
            );
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}
