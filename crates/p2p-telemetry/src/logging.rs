use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::TelemetryConfig;
use crate::TelemetryError;

/// Installs the process-wide `tracing` subscriber. Safe to call once per
/// process; a second call returns an error rather than panicking, since the
/// hosting application may already have installed its own subscriber.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Config(e.to_string()))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .json();

    let result = if config.json_logs {
        tracing::subscriber::set_global_default(subscriber.finish())
    } else {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .or_else(|_| EnvFilter::try_new(&config.log_level))
                        .map_err(|e| TelemetryError::Config(e.to_string()))?,
                )
                .finish(),
        )
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
