//! # P2P Telemetry
//!
//! Structured logging (`tracing`) and in-process Prometheus metrics for the
//! networking core. This crate never dials an external collector — no
//! OTLP, no Loki push — the hosting application scrapes [`metrics::gather`]
//! on whatever cadence and surface it chooses.

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use metrics::{
    gather, register_metrics, BANS_TOTAL, DIALS_TOTAL, EVICTIONS_TOTAL, GOSSIP_DEDUP_HITS,
    MESSAGES_DROPPED, MESSAGES_RECEIVED, MESSAGES_SENT, PEERS_CONNECTED, PEERS_INBOUND,
    PEERS_OUTBOUND, REPUTATION_DENIALS_TOTAL, SYNC_INFLIGHT_REQUESTS, SYNC_LOCAL_HEIGHT,
    SYNC_TARGET_HEIGHT,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("failed to initialize metrics: {0}")]
    MetricsInit(String),

    #[error("invalid telemetry configuration: {0}")]
    Config(String),
}

/// Initializes logging and metrics. Returns a guard whose drop logs a
/// shutdown line; holding it for the process lifetime is sufficient.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    logging::init_logging(&config)?;
    metrics::register_metrics()?;
    tracing::info!(service = %config.service_name, "telemetry initialized");
    Ok(TelemetryGuard { _priv: () })
}

pub struct TelemetryGuard {
    _priv: (),
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("telemetry shutting down");
    }
}

/// Convenience macro for creating a span scoped to one of the five
/// components, matching the shape used throughout the networking core's
/// service layer.
#[macro_export]
macro_rules! component_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
