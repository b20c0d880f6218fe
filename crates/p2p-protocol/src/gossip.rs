//! Outbound gossip fanout selection.

use p2p_types::{GossipClass, PeerId};

use crate::config::ProtocolConfig;
use crate::dedup::{Fingerprint, GossipDedup};

/// A candidate gossip target: enough information to rank and filter
/// without the caller handing over its whole connection table.
#[derive(Debug, Clone, Copy)]
pub struct GossipPeer {
    pub id: PeerId,
    pub score: f64,
}

fn fanout_for(class: GossipClass, config: &ProtocolConfig) -> usize {
    match class {
        GossipClass::Block => config.block_fanout,
        GossipClass::Tx => config.tx_fanout,
        GossipClass::PeerExchange => config.pex_fanout,
    }
}

/// Selects up to the class's fanout from `peers`, preferring the
/// highest-reputation peers that (a) meet the minimum gossip score and (b)
/// have not already been told this fingerprint. Mirrors
/// `select_peers_for_propagation`'s reputation-sorted-then-truncate shape.
pub fn select_gossip_targets(
    peers: &[GossipPeer],
    class: GossipClass,
    fingerprint: Fingerprint,
    dedup: &GossipDedup,
    config: &ProtocolConfig,
) -> Vec<PeerId> {
    let fanout = fanout_for(class, config);
    let mut eligible: Vec<&GossipPeer> = peers
        .iter()
        .filter(|p| p.score >= config.min_peer_score)
        .filter(|p| !dedup.already_told(fingerprint, &p.id))
        .collect();
    eligible.sort_by(|a, b| b.score.total_cmp(&a.score));
    eligible.truncate(fanout);
    eligible.into_iter().map(|p| p.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn peer(id: u8, score: f64) -> GossipPeer {
        GossipPeer { id: PeerId::new([id; 32]), score }
    }

    #[test]
    fn selects_highest_reputation_peers_up_to_fanout() {
        let config = ProtocolConfig { block_fanout: 2, ..ProtocolConfig::for_testing() };
        let dedup = GossipDedup::new(2, Duration::from_secs(60));
        let peers = vec![peer(1, 40.0), peer(2, 90.0), peer(3, 60.0)];
        let fp = 7u64;
        let selected = select_gossip_targets(&peers, GossipClass::Block, fp, &dedup, &config);
        assert_eq!(selected, vec![PeerId::new([2; 32]), PeerId::new([3; 32])]);
    }

    #[test]
    fn peers_below_min_score_are_excluded() {
        let config = ProtocolConfig { min_peer_score: 30.0, ..ProtocolConfig::for_testing() };
        let dedup = GossipDedup::new(2, Duration::from_secs(60));
        let peers = vec![peer(1, 10.0), peer(2, 90.0)];
        let selected = select_gossip_targets(&peers, GossipClass::Tx, 1, &dedup, &config);
        assert_eq!(selected, vec![PeerId::new([2; 32])]);
    }

    #[test]
    fn peers_already_told_are_skipped() {
        let config = ProtocolConfig::for_testing();
        let dedup = GossipDedup::new(2, Duration::from_secs(60));
        let fp = 42u64;
        dedup.mark_told(fp, PeerId::new([2; 32]));
        let peers = vec![peer(1, 50.0), peer(2, 90.0)];
        let selected = select_gossip_targets(&peers, GossipClass::Block, fp, &dedup, &config);
        assert_eq!(selected, vec![PeerId::new([1; 32])]);
    }
}
