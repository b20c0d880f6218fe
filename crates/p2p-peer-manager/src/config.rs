use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PeerManagerConfig {
    /// Maximum inbound connections, not counting unconditional peers.
    pub max_inbound: usize,
    /// Maximum outbound connections, not counting unconditional peers.
    pub max_outbound: usize,
    /// Outbound dials allowed to be in flight at once.
    pub dial_concurrency: usize,
    /// Base reconnect delay for persistent peers.
    pub reconnect_backoff_base: Duration,
    /// Reconnect delay ceiling.
    pub reconnect_backoff_cap: Duration,
    /// Fractional jitter applied to each backoff (e.g. 0.2 = +/-20%).
    pub reconnect_jitter: f64,
    /// How often the maintenance loop runs.
    pub maintenance_interval: Duration,
    /// A connection with no activity for this long is disconnected.
    pub idle_timeout: Duration,
    /// Maintenance tries to keep at least this many outbound connections up.
    pub min_outbound: usize,
}

impl Default for PeerManagerConfig {
    fn default() -> Self {
        Self {
            max_inbound: 25,
            max_outbound: 25,
            dial_concurrency: 8,
            reconnect_backoff_base: Duration::from_secs(2),
            reconnect_backoff_cap: Duration::from_secs(10 * 60),
            reconnect_jitter: 0.2,
            maintenance_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(5 * 60),
            min_outbound: 8,
        }
    }
}

impl PeerManagerConfig {
    /// Tight caps and compressed windows for tests.
    pub fn for_testing() -> Self {
        Self {
            max_inbound: 3,
            max_outbound: 3,
            dial_concurrency: 2,
            reconnect_backoff_base: Duration::from_millis(10),
            reconnect_backoff_cap: Duration::from_millis(100),
            reconnect_jitter: 0.2,
            maintenance_interval: Duration::from_millis(50),
            idle_timeout: Duration::from_secs(5 * 60),
            min_outbound: 2,
        }
    }
}
