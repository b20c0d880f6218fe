//! Unified configuration for the five networking components, loaded as:
//! built-in `Default` -> optional TOML file -> a small allow-listed set of
//! environment variable overrides. Key material never lives here: the
//! signing key behind a node's identity is supplied to [`crate::Node::new`]
//! directly by the hosting application.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use p2p_addrbook::AddressBookConfig;
use p2p_peer_manager::PeerManagerConfig;
use p2p_protocol::ProtocolConfig;
use p2p_reputation::ReputationConfig;
use p2p_sync::SyncConfig;
use p2p_types::PeerId;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid peer address {0:?}: {1}")]
    InvalidPeerAddress(String, String),
    #[error("invalid hex peer id {0:?}: {1}")]
    InvalidPeerId(String, String),
}

/// Networking and connection-lifecycle tunables, mirroring
/// [`ProtocolConfig`] and [`PeerManagerConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub listen_addr: String,
    pub max_inbound: usize,
    pub max_outbound: usize,
    pub min_outbound: usize,
    pub dial_concurrency: usize,
    pub reconnect_backoff_base_secs: u64,
    pub reconnect_backoff_cap_secs: u64,
    pub reconnect_jitter: f64,
    pub maintenance_interval_secs: u64,
    pub idle_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub dial_timeout_secs: u64,
    pub ping_interval_secs: u64,
    pub ping_timeout_secs: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        let pm = PeerManagerConfig::default();
        let pc = ProtocolConfig::default();
        Self {
            listen_addr: "0.0.0.0:26656".to_string(),
            max_inbound: pm.max_inbound,
            max_outbound: pm.max_outbound,
            min_outbound: pm.min_outbound,
            dial_concurrency: pm.dial_concurrency,
            reconnect_backoff_base_secs: pm.reconnect_backoff_base.as_secs(),
            reconnect_backoff_cap_secs: pm.reconnect_backoff_cap.as_secs(),
            reconnect_jitter: pm.reconnect_jitter,
            maintenance_interval_secs: pm.maintenance_interval.as_secs(),
            idle_timeout_secs: pm.idle_timeout.as_secs(),
            handshake_timeout_secs: pc.handshake_timeout.as_secs(),
            read_timeout_secs: pc.read_timeout.as_secs(),
            write_timeout_secs: pc.write_timeout.as_secs(),
            dial_timeout_secs: pc.dial_timeout.as_secs(),
            ping_interval_secs: pc.ping_interval.as_secs(),
            ping_timeout_secs: pc.ping_timeout.as_secs(),
        }
    }
}

/// Address book shape and the fixed peer lists consulted at startup,
/// mirroring [`AddressBookConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// `"<hex peer id>@host:port"` entries seeded into an empty address book.
    pub seeds: Vec<String>,
    /// Same shape as `seeds`; distinguished only by the source tag recorded
    /// against each address book entry.
    pub bootstrap: Vec<String>,
    /// Peers the connection manager keeps redialing regardless of the
    /// general outbound target.
    pub persistent_peers: Vec<String>,
    /// Peers exempt from inbound/outbound slot caps.
    pub unconditional_peers: Vec<String>,
    pub new_bucket_count: usize,
    pub tried_bucket_count: usize,
    pub bucket_size: usize,
    pub max_per_subnet_per_bucket: usize,
    pub max_per_subnet_total: usize,
    pub tried_selection_fraction: f64,
    pub autosave_interval_secs: u64,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let ab = AddressBookConfig::default();
        Self {
            seeds: Vec::new(),
            bootstrap: Vec::new(),
            persistent_peers: Vec::new(),
            unconditional_peers: Vec::new(),
            new_bucket_count: ab.new_bucket_count,
            tried_bucket_count: ab.tried_bucket_count,
            bucket_size: ab.bucket_size,
            max_per_subnet_per_bucket: ab.max_per_subnet_per_bucket,
            max_per_subnet_total: ab.max_per_subnet_total,
            tried_selection_fraction: ab.tried_selection_fraction,
            autosave_interval_secs: ab.autosave_interval.as_secs(),
        }
    }
}

/// Gossip fanout, dedup and per-peer rate limiting, mirroring the gossip
/// fields of [`ProtocolConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GossipSection {
    pub block_fanout: usize,
    pub tx_fanout: usize,
    pub pex_fanout: usize,
    pub pex_interval_secs: u64,
    pub dedup_ttl_secs: u64,
    pub dedup_shards: usize,
    pub min_peer_score: f64,
    pub rate_max_blocks_per_sec: u64,
    pub rate_max_tx_per_sec: u64,
    pub rate_max_msgs_per_sec: u64,
    pub rate_max_bytes_per_sec: u64,
}

impl Default for GossipSection {
    fn default() -> Self {
        let pc = ProtocolConfig::default();
        Self {
            block_fanout: pc.block_fanout,
            tx_fanout: pc.tx_fanout,
            pex_fanout: pc.pex_fanout,
            pex_interval_secs: pc.pex_interval.as_secs(),
            dedup_ttl_secs: pc.dedup_ttl.as_secs(),
            dedup_shards: pc.dedup_shards,
            min_peer_score: pc.min_peer_score,
            rate_max_blocks_per_sec: pc.rate_max_blocks_per_sec,
            rate_max_tx_per_sec: pc.rate_max_tx_per_sec,
            rate_max_msgs_per_sec: pc.rate_max_msgs_per_sec,
            rate_max_bytes_per_sec: pc.rate_max_bytes_per_sec,
        }
    }
}

/// Block-range sync scheduling, mirroring [`SyncConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub reliability_floor: f64,
    pub max_concurrent_requests: usize,
    pub batch_size_min: u64,
    pub batch_size_max: u64,
    pub request_deadline_secs: u64,
    pub retry_attempts: u32,
    pub reorder_window_secs: u64,
    pub caught_confirm_interval_secs: u64,
    pub tick_interval_millis: u64,
    pub snapshot_consensus_peers: usize,
    pub snapshot_consensus_threshold: f64,
}

impl Default for SyncSection {
    fn default() -> Self {
        let sc = SyncConfig::default();
        Self {
            reliability_floor: sc.reliability_floor,
            max_concurrent_requests: sc.max_concurrent_requests,
            batch_size_min: sc.batch_size_min,
            batch_size_max: sc.batch_size_max,
            request_deadline_secs: sc.request_deadline.as_secs(),
            retry_attempts: sc.retry_attempts,
            reorder_window_secs: sc.reorder_window.as_secs(),
            caught_confirm_interval_secs: sc.caught_confirm_interval.as_secs(),
            tick_interval_millis: sc.tick_interval.as_millis() as u64,
            snapshot_consensus_peers: sc.snapshot_consensus_peers,
            snapshot_consensus_threshold: sc.snapshot_consensus_threshold,
        }
    }
}

/// Scoring weights, admission thresholds, eclipse resistance and ban/decay
/// policy, mirroring [`ReputationConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReputationSection {
    pub weight_uptime: f64,
    pub weight_msg_validity: f64,
    pub weight_latency: f64,
    pub weight_block_prop: f64,
    pub weight_violations: f64,
    pub untrusted_below: f64,
    pub low_below: f64,
    pub medium_below: f64,
    pub connect_score_threshold: f64,
    pub max_peers_per_subnet: usize,
    pub max_peers_per_asn: usize,
    pub max_new_peers_per_hour: usize,
    pub diverse_max_fraction_per_country: f64,
    pub diverse_min_countries: usize,
    pub temp_ban_durations_secs: Vec<u64>,
    pub max_temp_bans_before_permanent: u32,
    pub decay_interval_secs: u64,
    pub decay_rate: f64,
    pub decay_neutral: f64,
    pub flush_interval_secs: u64,
    /// Hex-encoded peer ids exempt from admission screening and bans.
    pub whitelist: Vec<String>,
}

impl Default for ReputationSection {
    fn default() -> Self {
        let rc = ReputationConfig::default();
        Self {
            weight_uptime: rc.weight_uptime,
            weight_msg_validity: rc.weight_msg_validity,
            weight_latency: rc.weight_latency,
            weight_block_prop: rc.weight_block_prop,
            weight_violations: rc.weight_violations,
            untrusted_below: rc.untrusted_below,
            low_below: rc.low_below,
            medium_below: rc.medium_below,
            connect_score_threshold: rc.connect_score_threshold,
            max_peers_per_subnet: rc.max_peers_per_subnet,
            max_peers_per_asn: rc.max_peers_per_asn,
            max_new_peers_per_hour: rc.max_new_peers_per_hour,
            diverse_max_fraction_per_country: rc.diverse_max_fraction_per_country,
            diverse_min_countries: rc.diverse_min_countries,
            temp_ban_durations_secs: rc.temp_ban_durations.iter().map(Duration::as_secs).collect(),
            max_temp_bans_before_permanent: rc.max_temp_bans_before_permanent,
            decay_interval_secs: rc.decay_interval.as_secs(),
            decay_rate: rc.decay_rate,
            decay_neutral: rc.decay_neutral,
            flush_interval_secs: rc.flush_interval.as_secs(),
            whitelist: Vec::new(),
        }
    }
}

/// Root configuration for a node. `data_dir` holds `addrbook.json` and the
/// `reputation/` subdirectory; everything else groups by the component it
/// configures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub network: NetworkSection,
    pub discovery: DiscoverySection,
    pub gossip: GossipSection,
    pub sync: SyncSection,
    pub reputation: ReputationSection,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            network: NetworkSection::default(),
            discovery: DiscoverySection::default(),
            gossip: GossipSection::default(),
            sync: SyncSection::default(),
            reputation: ReputationSection::default(),
        }
    }
}

impl NodeConfig {
    /// Loads defaults, overlays an optional TOML file, then applies the
    /// allow-listed environment overrides (`P2P_LISTEN_ADDR`, `P2P_DATA_DIR`).
    /// `P2P_LOG_LEVEL` is read directly by the telemetry crate and never
    /// touches this struct.
    pub fn load(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match toml_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?
            }
            None => Self::default(),
        };
        if let Ok(addr) = std::env::var("P2P_LISTEN_ADDR") {
            config.network.listen_addr = addr;
        }
        if let Ok(dir) = std::env::var("P2P_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            handshake_timeout: Duration::from_secs(self.network.handshake_timeout_secs),
            read_timeout: Duration::from_secs(self.network.read_timeout_secs),
            write_timeout: Duration::from_secs(self.network.write_timeout_secs),
            dial_timeout: Duration::from_secs(self.network.dial_timeout_secs),
            ping_interval: Duration::from_secs(self.network.ping_interval_secs),
            ping_timeout: Duration::from_secs(self.network.ping_timeout_secs),
            block_fanout: self.gossip.block_fanout,
            tx_fanout: self.gossip.tx_fanout,
            pex_fanout: self.gossip.pex_fanout,
            pex_interval: Duration::from_secs(self.gossip.pex_interval_secs),
            dedup_ttl: Duration::from_secs(self.gossip.dedup_ttl_secs),
            dedup_shards: self.gossip.dedup_shards,
            min_peer_score: self.gossip.min_peer_score,
            rate_max_blocks_per_sec: self.gossip.rate_max_blocks_per_sec,
            rate_max_tx_per_sec: self.gossip.rate_max_tx_per_sec,
            rate_max_msgs_per_sec: self.gossip.rate_max_msgs_per_sec,
            rate_max_bytes_per_sec: self.gossip.rate_max_bytes_per_sec,
        }
    }

    pub fn peer_manager_config(&self) -> PeerManagerConfig {
        PeerManagerConfig {
            max_inbound: self.network.max_inbound,
            max_outbound: self.network.max_outbound,
            dial_concurrency: self.network.dial_concurrency,
            reconnect_backoff_base: Duration::from_secs(self.network.reconnect_backoff_base_secs),
            reconnect_backoff_cap: Duration::from_secs(self.network.reconnect_backoff_cap_secs),
            reconnect_jitter: self.network.reconnect_jitter,
            maintenance_interval: Duration::from_secs(self.network.maintenance_interval_secs),
            idle_timeout: Duration::from_secs(self.network.idle_timeout_secs),
            min_outbound: self.network.min_outbound,
        }
    }

    pub fn addrbook_config(&self) -> AddressBookConfig {
        AddressBookConfig {
            new_bucket_count: self.discovery.new_bucket_count,
            tried_bucket_count: self.discovery.tried_bucket_count,
            bucket_size: self.discovery.bucket_size,
            max_per_subnet_per_bucket: self.discovery.max_per_subnet_per_bucket,
            max_per_subnet_total: self.discovery.max_per_subnet_total,
            tried_selection_fraction: self.discovery.tried_selection_fraction,
            autosave_interval: Duration::from_secs(self.discovery.autosave_interval_secs),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            reliability_floor: self.sync.reliability_floor,
            max_concurrent_requests: self.sync.max_concurrent_requests,
            batch_size_min: self.sync.batch_size_min,
            batch_size_max: self.sync.batch_size_max,
            request_deadline: Duration::from_secs(self.sync.request_deadline_secs),
            retry_attempts: self.sync.retry_attempts,
            reorder_window: Duration::from_secs(self.sync.reorder_window_secs),
            caught_confirm_interval: Duration::from_secs(self.sync.caught_confirm_interval_secs),
            tick_interval: Duration::from_millis(self.sync.tick_interval_millis),
            snapshot_consensus_peers: self.sync.snapshot_consensus_peers,
            snapshot_consensus_threshold: self.sync.snapshot_consensus_threshold,
        }
    }

    pub fn reputation_config(&self) -> Result<ReputationConfig, ConfigError> {
        let whitelist = self
            .reputation
            .whitelist
            .iter()
            .map(|hex| parse_peer_id(hex))
            .collect::<Result<Vec<PeerId>, ConfigError>>()?;
        Ok(ReputationConfig {
            weight_uptime: self.reputation.weight_uptime,
            weight_msg_validity: self.reputation.weight_msg_validity,
            weight_latency: self.reputation.weight_latency,
            weight_block_prop: self.reputation.weight_block_prop,
            weight_violations: self.reputation.weight_violations,
            untrusted_below: self.reputation.untrusted_below,
            low_below: self.reputation.low_below,
            medium_below: self.reputation.medium_below,
            connect_score_threshold: self.reputation.connect_score_threshold,
            max_peers_per_subnet: self.reputation.max_peers_per_subnet,
            max_peers_per_asn: self.reputation.max_peers_per_asn,
            max_new_peers_per_hour: self.reputation.max_new_peers_per_hour,
            diverse_max_fraction_per_country: self.reputation.diverse_max_fraction_per_country,
            diverse_min_countries: self.reputation.diverse_min_countries,
            temp_ban_durations: self.reputation.temp_ban_durations_secs.iter().copied().map(Duration::from_secs).collect(),
            max_temp_bans_before_permanent: self.reputation.max_temp_bans_before_permanent,
            decay_interval: Duration::from_secs(self.reputation.decay_interval_secs),
            decay_rate: self.reputation.decay_rate,
            decay_neutral: self.reputation.decay_neutral,
            flush_interval: Duration::from_secs(self.reputation.flush_interval_secs),
            whitelist,
        })
    }
}

/// Parses a `"<64 hex chars>"` peer id, the same encoding [`PeerId::to_hex`]
/// produces.
pub fn parse_peer_id(hex: &str) -> Result<PeerId, ConfigError> {
    if hex.len() != 64 {
        return Err(ConfigError::InvalidPeerId(hex.to_string(), "expected 64 hex characters".to_string()));
    }
    let mut bytes = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let s = std::str::from_utf8(chunk).map_err(|e| ConfigError::InvalidPeerId(hex.to_string(), e.to_string()))?;
        bytes[i] = u8::from_str_radix(s, 16).map_err(|e| ConfigError::InvalidPeerId(hex.to_string(), e.to_string()))?;
    }
    Ok(PeerId::new(bytes))
}

impl fmt::Display for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NodeConfig {{ data_dir: {:?}, listen_addr: {} }}",
            self.data_dir, self.network.listen_addr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_component_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.peer_manager_config().max_inbound, PeerManagerConfig::default().max_inbound);
        assert_eq!(config.protocol_config().block_fanout, ProtocolConfig::default().block_fanout);
        assert_eq!(config.sync_config().batch_size_max, SyncConfig::default().batch_size_max);
        assert_eq!(
            config.reputation_config().unwrap().connect_score_threshold,
            ReputationConfig::default().connect_score_threshold
        );
    }

    #[test]
    fn toml_overlay_keeps_unspecified_fields_at_default() {
        let toml_text = r#"
            data_dir = "/var/lib/p2p"

            [network]
            listen_addr = "0.0.0.0:30000"
        "#;
        let config: NodeConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/p2p"));
        assert_eq!(config.network.listen_addr, "0.0.0.0:30000");
        assert_eq!(config.network.max_inbound, PeerManagerConfig::default().max_inbound);
    }

    #[test]
    fn parse_peer_id_roundtrips_to_hex() {
        let id = PeerId::new([0xab; 32]);
        let parsed = parse_peer_id(&id.to_hex()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_peer_id_rejects_wrong_length() {
        assert!(parse_peer_id("abcd").is_err());
    }
}
