use std::time::Duration;

/// Every tunable named in the wire/gossip/rate-limit section of the
/// configuration surface. Defaults match the literal values called out by
/// the component design.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub handshake_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub dial_timeout: Duration,

    /// Interval between pings sent on an otherwise idle connection.
    pub ping_interval: Duration,
    /// How long a pong may take before the ping is considered failed.
    pub ping_timeout: Duration,

    pub block_fanout: usize,
    pub tx_fanout: usize,
    pub pex_fanout: usize,
    pub pex_interval: Duration,

    pub dedup_ttl: Duration,
    pub dedup_shards: usize,
    pub min_peer_score: f64,

    pub rate_max_blocks_per_sec: u64,
    pub rate_max_tx_per_sec: u64,
    pub rate_max_msgs_per_sec: u64,
    pub rate_max_bytes_per_sec: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            dial_timeout: Duration::from_secs(5),

            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(10),

            block_fanout: 8,
            tx_fanout: 4,
            pex_fanout: 3,
            pex_interval: Duration::from_secs(30),

            dedup_ttl: Duration::from_secs(5 * 60),
            dedup_shards: 16,
            min_peer_score: 30.0,

            rate_max_blocks_per_sec: 10,
            rate_max_tx_per_sec: 100,
            rate_max_msgs_per_sec: 50,
            rate_max_bytes_per_sec: 5 * 1024 * 1024,
        }
    }
}

impl ProtocolConfig {
    /// Compressed windows and tighter fanouts for tests.
    pub fn for_testing() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_millis(500),
            dial_timeout: Duration::from_millis(200),
            ping_interval: Duration::from_millis(50),
            ping_timeout: Duration::from_millis(50),
            pex_interval: Duration::from_millis(50),
            dedup_ttl: Duration::from_millis(200),
            dedup_shards: 4,
            ..Self::default()
        }
    }
}
