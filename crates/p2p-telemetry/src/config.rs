use std::env;

/// Logging/metrics configuration for the networking core. Unlike a full
/// LGTM stack, this crate never dials an external collector: the hosting
/// application owns exporters and scrapes [`crate::metrics::gather`] itself.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "p2p-core".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults when unset.
    ///
    /// - `P2P_LOG_LEVEL` or `RUST_LOG`: log level filter (default `info`).
    /// - `P2P_JSON_LOGS`: emit JSON-formatted logs (default `false`).
    pub fn from_env() -> Self {
        Self {
            service_name: "p2p-core".to_string(),
            log_level: env::var("P2P_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
            json_logs: env::var("P2P_JSON_LOGS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
    }
}
