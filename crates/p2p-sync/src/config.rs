use std::time::Duration;

/// Every tunable named in the sync section of the configuration surface.
/// Defaults match the literal values called out by the component design.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Peers with reliability below this are skipped for new requests.
    pub reliability_floor: f64,
    /// Bounded set of concurrent in-flight block-range requests.
    pub max_concurrent_requests: usize,
    /// Adaptive batch size bounds, in blocks.
    pub batch_size_min: u64,
    pub batch_size_max: u64,
    /// How long a request may run before it is reassigned.
    pub request_deadline: Duration,
    /// Reassignments allowed before a batch is abandoned and sync re-plans
    /// from the next known-good height.
    pub retry_attempts: u32,
    /// How long an out-of-order block may sit in the reorder buffer before
    /// the gap is declared unclosable.
    pub reorder_window: Duration,
    /// Local height must equal target for this long before Caught is
    /// declared, so a single stale Status doesn't flap the state machine.
    pub caught_confirm_interval: Duration,
    /// Scheduler tick period.
    pub tick_interval: Duration,
    /// Minimum independent peers that must agree on a snapshot manifest
    /// hash before it is adopted.
    pub snapshot_consensus_peers: usize,
    pub snapshot_consensus_threshold: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reliability_floor: 0.3,
            max_concurrent_requests: 10,
            batch_size_min: 100,
            batch_size_max: 500,
            request_deadline: Duration::from_secs(10),
            retry_attempts: 3,
            reorder_window: Duration::from_secs(30),
            caught_confirm_interval: Duration::from_secs(30),
            tick_interval: Duration::from_millis(500),
            snapshot_consensus_peers: 3,
            snapshot_consensus_threshold: 2.0 / 3.0,
        }
    }
}

impl SyncConfig {
    /// Compressed windows and a smaller batch range for tests.
    pub fn for_testing() -> Self {
        Self {
            request_deadline: Duration::from_millis(300),
            reorder_window: Duration::from_millis(500),
            caught_confirm_interval: Duration::from_millis(100),
            tick_interval: Duration::from_millis(20),
            batch_size_min: 4,
            batch_size_max: 16,
            snapshot_consensus_peers: 2,
            ..Self::default()
        }
    }
}
