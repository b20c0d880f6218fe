use serde::{Deserialize, Serialize};

use crate::addr::NetAddr;
use crate::ids::PeerId;
use crate::time::Timestamp;

/// Provenance of a discovered address; drives address-book bucketing and
/// reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerSource {
    Seed,
    Bootstrap,
    Pex,
    Manual,
    Persistent,
    Inbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bucket {
    New,
    Tried,
}

/// A known endpoint and its discovery/dial history. Endpoint equality is
/// `(host, port)`; identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAddress {
    pub id: PeerId,
    pub addr: NetAddr,
    pub source: PeerSource,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub last_dialed: Option<Timestamp>,
    pub attempts: u32,
    pub bucket: Bucket,
}

impl PeerAddress {
    pub fn new(id: PeerId, addr: NetAddr, source: PeerSource, now: Timestamp) -> Self {
        Self {
            id,
            addr,
            source,
            first_seen: now,
            last_seen: now,
            last_dialed: None,
            attempts: 0,
            bucket: Bucket::New,
        }
    }

    /// Endpoint-level equality: same host and port regardless of claimed id.
    pub fn same_endpoint(&self, other: &PeerAddress) -> bool {
        self.addr == other.addr
    }

    pub fn mark_dial_failed(&mut self, now: Timestamp) {
        self.last_dialed = Some(now);
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn mark_handshake_success(&mut self, now: Timestamp) {
        self.attempts = 0;
        self.last_seen = now;
        self.last_dialed = Some(now);
        self.bucket = Bucket::Tried;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::IpAddr;

    fn addr(port: u16) -> NetAddr {
        NetAddr::new(IpAddr::v4(1, 2, 3, 4), port)
    }

    #[test]
    fn dial_failure_increments_attempts() {
        let mut p = PeerAddress::new(PeerId::new([1; 32]), addr(1), PeerSource::Seed, Timestamp::new(0));
        p.mark_dial_failed(Timestamp::new(10));
        p.mark_dial_failed(Timestamp::new(20));
        assert_eq!(p.attempts, 2);
    }

    #[test]
    fn handshake_success_resets_attempts_and_promotes() {
        let mut p = PeerAddress::new(PeerId::new([1; 32]), addr(1), PeerSource::Seed, Timestamp::new(0));
        p.mark_dial_failed(Timestamp::new(5));
        p.mark_handshake_success(Timestamp::new(10));
        assert_eq!(p.attempts, 0);
        assert_eq!(p.bucket, Bucket::Tried);
    }
}
