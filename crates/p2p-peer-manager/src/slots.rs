use std::collections::HashMap;

use p2p_types::{Direction, NetAddr, PeerId, Timestamp};

use crate::config::PeerManagerConfig;

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: PeerId,
    pub direction: Direction,
    pub remote_addr: NetAddr,
    pub connected_at: Timestamp,
    pub last_activity: Timestamp,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Unconditional peers bypass both the inbound/outbound caps and
    /// eviction — an operator-configured allowlist, not a scoring outcome.
    pub unconditional: bool,
    /// Score observed at admission time, used only to rank eviction
    /// candidates against each other; the reputation component remains
    /// the source of truth for the live value.
    last_known_score: f64,
}

impl ConnectionInfo {
    fn new(
        id: PeerId,
        direction: Direction,
        remote_addr: NetAddr,
        now: Timestamp,
        unconditional: bool,
        score: f64,
    ) -> Self {
        Self {
            id,
            direction,
            remote_addr,
            connected_at: now,
            last_activity: now,
            bytes_in: 0,
            bytes_out: 0,
            unconditional,
            last_known_score: score,
        }
    }

    pub fn idle_for(&self, now: Timestamp) -> u64 {
        now.as_secs().saturating_sub(self.last_activity.as_secs())
    }

    fn score_for_eviction(&self) -> f64 {
        self.last_known_score
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AcceptResult {
    Accepted,
    Rejected,
    Evicted(PeerId),
}

#[derive(Debug, Clone, Default)]
pub struct SlotStats {
    pub inbound_count: usize,
    pub outbound_count: usize,
    pub max_inbound: usize,
    pub max_outbound: usize,
}

/// Tracks live connections and enforces the inbound/outbound caps.
/// Outbound slots are reserved by the dial pipeline before a connection
/// exists; inbound slots are claimed as connections arrive, evicting the
/// worst-scored non-whitelisted inbound peer when full.
#[derive(Debug, Default)]
pub struct ConnectionSlots {
    connections: HashMap<PeerId, ConnectionInfo>,
}

impl ConnectionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inbound_count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| c.direction == Direction::Inbound && !c.unconditional)
            .count()
    }

    pub fn outbound_count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| c.direction == Direction::Outbound && !c.unconditional)
            .count()
    }

    pub fn has_outbound_slot(&self, config: &PeerManagerConfig) -> bool {
        self.outbound_count() < config.max_outbound
    }

    pub fn reserve_outbound(
        &mut self,
        id: PeerId,
        remote_addr: NetAddr,
        now: Timestamp,
        unconditional: bool,
        config: &PeerManagerConfig,
    ) -> bool {
        if self.connections.contains_key(&id) {
            return false;
        }
        if !unconditional && !self.has_outbound_slot(config) {
            return false;
        }
        self.connections.insert(
            id,
            ConnectionInfo::new(id, Direction::Outbound, remote_addr, now, unconditional, 0.0),
        );
        true
    }

    /// `score_of` and `is_whitelisted` are supplied by the caller (backed
    /// by the reputation component) so this table never depends on a
    /// concrete scoring implementation.
    pub fn try_accept_inbound(
        &mut self,
        id: PeerId,
        remote_addr: NetAddr,
        now: Timestamp,
        unconditional: bool,
        score: f64,
        is_whitelisted: impl Fn(&PeerId) -> bool,
        config: &PeerManagerConfig,
    ) -> (AcceptResult, Option<ConnectionInfo>) {
        if self.connections.contains_key(&id) {
            return (AcceptResult::Rejected, None);
        }

        if unconditional || self.inbound_count() < config.max_inbound {
            self.connections.insert(
                id,
                ConnectionInfo::new(id, Direction::Inbound, remote_addr, now, unconditional, score),
            );
            return (AcceptResult::Accepted, None);
        }

        match self.find_eviction_candidate(score, &is_whitelisted) {
            Some(victim_id) => {
                let victim = self.connections.remove(&victim_id);
                self.connections.insert(
                    id,
                    ConnectionInfo::new(id, Direction::Inbound, remote_addr, now, unconditional, score),
                );
                (AcceptResult::Evicted(victim_id), victim)
            }
            None => (AcceptResult::Rejected, None),
        }
    }

    /// Picks the lowest-scored non-whitelisted, non-unconditional inbound
    /// connection, breaking ties by oldest `last_activity`. Only evicts if
    /// the incoming peer's score beats the victim's.
    fn find_eviction_candidate(
        &self,
        new_peer_score: f64,
        is_whitelisted: &impl Fn(&PeerId) -> bool,
    ) -> Option<PeerId> {
        self.connections
            .values()
            .filter(|c| c.direction == Direction::Inbound && !c.unconditional)
            .filter(|c| !is_whitelisted(&c.id))
            .min_by(|a, b| {
                a.score_for_eviction()
                    .partial_cmp(&b.score_for_eviction())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.last_activity.as_secs().cmp(&b.last_activity.as_secs()))
            })
            .filter(|victim| new_peer_score > victim.score_for_eviction())
            .map(|victim| victim.id)
    }

    pub fn disconnect(&mut self, id: &PeerId) -> Option<ConnectionInfo> {
        self.connections.remove(id)
    }

    pub fn touch(&mut self, id: &PeerId, now: Timestamp) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.last_activity = now;
        }
    }

    pub fn record_bytes(&mut self, id: &PeerId, bytes_in: u64, bytes_out: u64) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.bytes_in = conn.bytes_in.saturating_add(bytes_in);
            conn.bytes_out = conn.bytes_out.saturating_add(bytes_out);
        }
    }

    pub fn get(&self, id: &PeerId) -> Option<&ConnectionInfo> {
        self.connections.get(id)
    }

    pub fn update_score(&mut self, id: &PeerId, score: f64) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.last_known_score = score;
        }
    }

    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.connections.keys().copied().collect()
    }

    pub fn idle_peers(&self, now: Timestamp, config: &PeerManagerConfig) -> Vec<PeerId> {
        self.connections
            .values()
            .filter(|c| !c.unconditional && c.idle_for(now) >= config.idle_timeout.as_secs())
            .map(|c| c.id)
            .collect()
    }

    pub fn stats(&self, config: &PeerManagerConfig) -> SlotStats {
        SlotStats {
            inbound_count: self.inbound_count(),
            outbound_count: self.outbound_count(),
            max_inbound: config.max_inbound,
            max_outbound: config.max_outbound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2p_types::IpAddr;

    fn addr(d: u8) -> NetAddr {
        NetAddr::new(IpAddr::v4(1, 2, 3, d), 9000)
    }

    #[test]
    fn inbound_overflow_evicts_lowest_scored() {
        let config = PeerManagerConfig::for_testing();
        let mut slots = ConnectionSlots::new();
        for i in 0..config.max_inbound as u8 {
            let id = PeerId::new([i + 1; 32]);
            let (result, _) = slots.try_accept_inbound(id, addr(i), Timestamp::new(i as u64), false, 10.0, |_| false, &config);
            assert_eq!(result, AcceptResult::Accepted);
        }
        slots.update_score(&PeerId::new([1; 32]), 1.0);

        let newcomer = PeerId::new([99; 32]);
        let (result, evicted) = slots.try_accept_inbound(newcomer, addr(200), Timestamp::new(100), false, 50.0, |_| false, &config);
        assert_eq!(result, AcceptResult::Evicted(PeerId::new([1; 32])));
        assert_eq!(evicted.unwrap().id, PeerId::new([1; 32]));
        assert!(slots.is_connected(&newcomer));
        assert!(!slots.is_connected(&PeerId::new([1; 32])));
    }

    #[test]
    fn whitelisted_peer_is_never_evicted() {
        let config = PeerManagerConfig::for_testing();
        let mut slots = ConnectionSlots::new();
        for i in 0..config.max_inbound as u8 {
            let id = PeerId::new([i + 1; 32]);
            slots.try_accept_inbound(id, addr(i), Timestamp::new(0), false, 1.0, |_| false, &config);
        }
        let newcomer = PeerId::new([99; 32]);
        let (result, _) = slots.try_accept_inbound(newcomer, addr(200), Timestamp::new(1), false, 50.0, |_| true, &config);
        assert_eq!(result, AcceptResult::Rejected);
    }

    #[test]
    fn unconditional_peers_bypass_caps() {
        let config = PeerManagerConfig::for_testing();
        let mut slots = ConnectionSlots::new();
        for i in 0..config.max_outbound as u8 {
            slots.reserve_outbound(PeerId::new([i + 1; 32]), addr(i), Timestamp::new(0), false, &config);
        }
        assert!(!slots.has_outbound_slot(&config));
        assert!(slots.reserve_outbound(PeerId::new([200; 32]), addr(201), Timestamp::new(0), true, &config));
    }
}
