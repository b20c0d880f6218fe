//! Parses the fixed peer lists out of [`NodeConfig`] and seeds the address
//! book and connection manager with them on startup.

use std::net::{IpAddr as StdIpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use p2p_addrbook::AddressBookManager;
use p2p_peer_manager::PeerManager;
use p2p_types::{IpAddr, NetAddr, PeerId, PeerSource, Timestamp};
use tracing::{info, warn};

use crate::config::{parse_peer_id, ConfigError, NodeConfig};

fn to_net_addr(addr: SocketAddr) -> NetAddr {
    let ip = match addr.ip() {
        StdIpAddr::V4(v4) => IpAddr::V4(v4.octets()),
        StdIpAddr::V6(v6) => IpAddr::V6(v6.octets()),
    };
    NetAddr::new(ip, addr.port())
}

/// Parses a `"<hex peer id>@host:port"` entry, the same shape `PeerAddress`
/// entries round-trip through in logs and config.
fn parse_peer_uri(entry: &str) -> Result<(PeerId, NetAddr), ConfigError> {
    let (id_part, host_part) = entry
        .split_once('@')
        .ok_or_else(|| ConfigError::InvalidPeerAddress(entry.to_string(), "missing '@' separator".to_string()))?;
    let id = parse_peer_id(id_part)?;
    let socket_addr = host_part
        .to_socket_addrs()
        .map_err(|e| ConfigError::InvalidPeerAddress(entry.to_string(), e.to_string()))?
        .next()
        .ok_or_else(|| ConfigError::InvalidPeerAddress(entry.to_string(), "address resolved to nothing".to_string()))?;
    Ok((id, to_net_addr(socket_addr)))
}

fn parse_all(entries: &[String]) -> Result<Vec<(PeerId, NetAddr)>, ConfigError> {
    entries.iter().map(|e| parse_peer_uri(e)).collect()
}

/// Parsed view of the discovery section's fixed peer lists.
pub struct Bootstrapper {
    seeds: Vec<(PeerId, NetAddr)>,
    bootstrap: Vec<(PeerId, NetAddr)>,
    persistent: Vec<(PeerId, NetAddr)>,
    unconditional: Vec<(PeerId, NetAddr)>,
}

impl Bootstrapper {
    pub fn from_config(config: &NodeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            seeds: parse_all(&config.discovery.seeds)?,
            bootstrap: parse_all(&config.discovery.bootstrap)?,
            persistent: parse_all(&config.discovery.persistent_peers)?,
            unconditional: parse_all(&config.discovery.unconditional_peers)?,
        })
    }

    /// Seeds an empty address book from `seeds`/`bootstrap`, registers
    /// `persistent_peers`/`unconditional_peers` with the connection manager
    /// and address book so the maintenance loop can redial them, then kicks
    /// off one immediate unconditional dial per fixed peer.
    pub async fn run(&self, addrbook: &Arc<AddressBookManager>, peer_manager: &Arc<PeerManager>, now: Timestamp) {
        if addrbook.size() == 0 {
            for (id, addr) in self.seeds.iter().chain(self.bootstrap.iter()) {
                let source = if self.seeds.iter().any(|(sid, _)| sid == id) {
                    PeerSource::Seed
                } else {
                    PeerSource::Bootstrap
                };
                if let Err(e) = addrbook.add(*id, *addr, source, addr, now) {
                    warn!(peer = %id, error = %e, "failed to seed address book entry");
                }
            }
            info!(count = self.seeds.len() + self.bootstrap.len(), "address book seeded on first start");
        }

        let unconditional_ids: std::collections::HashSet<PeerId> = self.unconditional.iter().map(|(id, _)| *id).collect();
        for (id, addr) in self.persistent.iter().chain(self.unconditional.iter()) {
            let _ = addrbook.add(*id, *addr, PeerSource::Persistent, addr, now);
            peer_manager.add_persistent(*id);
            if unconditional_ids.contains(id) {
                peer_manager.add_unconditional(*id);
            }
            let pm = Arc::clone(peer_manager);
            let (id, addr) = (*id, *addr);
            tokio::spawn(async move {
                if let Err(e) = pm.connect(id, addr, true).await {
                    warn!(peer = %id, error = %e, "initial dial to fixed peer failed, maintenance will retry");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use p2p_peer_manager::{Dialer, PeerManager, PeerManagerConfig, PeerManagerError};
    use p2p_reputation::{ReputationConfig, ReputationManager};
    use tokio::sync::mpsc;

    use super::*;

    struct AlwaysFails;
    #[async_trait::async_trait]
    impl Dialer for AlwaysFails {
        async fn dial(&self, _id: PeerId, _addr: NetAddr) -> Result<(), PeerManagerError> {
            Err(PeerManagerError::Io("no real peer in this test".to_string()))
        }
    }

    #[tokio::test]
    async fn unconditional_peers_are_tagged_distinctly_from_plain_persistent_ones() {
        let id_persistent = PeerId::new([1; 32]);
        let id_unconditional = PeerId::new([2; 32]);
        let mut config = NodeConfig::default();
        config.discovery.persistent_peers = vec![format!("{}@127.0.0.1:26001", id_persistent.to_hex())];
        config.discovery.unconditional_peers = vec![format!("{}@127.0.0.1:26002", id_unconditional.to_hex())];
        let bootstrapper = Bootstrapper::from_config(&config).unwrap();

        let (rep_tx, _rep_rx) = mpsc::channel(8);
        let reputation = ReputationManager::new(ReputationConfig::for_testing(), PathBuf::from("/tmp/unused"), rep_tx);
        let (ab_tx, _ab_rx) = mpsc::channel(8);
        let addrbook = AddressBookManager::new(
            p2p_addrbook::AddressBookConfig::for_testing(),
            PeerId::new([0; 32]),
            PathBuf::from("/tmp/unused"),
            ab_tx,
        );
        let (pm_tx, _pm_rx) = mpsc::channel(8);
        let (peer_manager, _events) = PeerManager::new(
            PeerManagerConfig::for_testing(),
            reputation,
            Arc::clone(&addrbook),
            Arc::new(AlwaysFails),
            pm_tx,
        );

        bootstrapper.run(&addrbook, &peer_manager, Timestamp::new(0)).await;

        assert!(!peer_manager.is_unconditional(&id_persistent));
        assert!(peer_manager.is_unconditional(&id_unconditional));
    }

    #[test]
    fn parses_hex_id_and_socket_addr() {
        let id = PeerId::new([0x11; 32]);
        let entry = format!("{}@127.0.0.1:26656", id.to_hex());
        let (parsed_id, addr) = parse_peer_uri(&entry).unwrap();
        assert_eq!(parsed_id, id);
        assert_eq!(addr.port, 26656);
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(parse_peer_uri("127.0.0.1:26656").is_err());
    }

    #[test]
    fn rejects_bad_peer_id() {
        assert!(parse_peer_uri("nothex@127.0.0.1:26656").is_err());
    }
}
