use std::collections::VecDeque;

use p2p_types::{NetAddr, PeerId, Score, Timestamp};
use serde::{Deserialize, Serialize};

use crate::config::ReputationConfig;

const EVENT_RING_CAPACITY: usize = 256;
const VIOLATION_WINDOW_SECS: u64 = 3600;
const MSG_VALIDITY_BONUS_CAP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrustLevel {
    Untrusted,
    Low,
    Medium,
    High,
    Whitelisted,
}

impl TrustLevel {
    pub fn from_score(score: f64, whitelisted: bool, config: &ReputationConfig) -> Self {
        if whitelisted {
            return TrustLevel::Whitelisted;
        }
        if score < config.untrusted_below {
            TrustLevel::Untrusted
        } else if score < config.low_below {
            TrustLevel::Low
        } else if score < config.medium_below {
            TrustLevel::Medium
        } else {
            TrustLevel::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerEventKind {
    ProtocolViolation,
    Malformed,
    Spam,
    InvalidBlock,
    DoubleSign,
    ValidMessage,
    BlockPropagated { fast: bool },
}

impl PeerEventKind {
    /// Magnitude subtracted from the violations accumulator; `None` for
    /// events that are not violations.
    pub fn violation_severity(&self) -> Option<f64> {
        match self {
            PeerEventKind::ProtocolViolation => Some(5.0),
            PeerEventKind::Malformed => Some(2.0),
            PeerEventKind::Spam => Some(10.0),
            PeerEventKind::InvalidBlock => Some(20.0),
            PeerEventKind::DoubleSign => Some(100.0),
            PeerEventKind::ValidMessage | PeerEventKind::BlockPropagated { .. } => None,
        }
    }

    pub fn triggers_immediate_permanent_ban(&self) -> bool {
        matches!(self, PeerEventKind::DoubleSign)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub valid_msgs: u64,
    pub invalid_msgs: u64,
    pub bytes: u64,
    pub blocks_fast: u64,
    pub blocks_total: u64,
    pub msg_validity_bonus: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BanInfo {
    pub temp_count: u32,
    pub permanently_banned: bool,
    pub banned_until: Option<Timestamp>,
    pub reason: Option<String>,
}

impl BanInfo {
    pub fn is_banned_at(&self, now: Timestamp) -> bool {
        if self.permanently_banned {
            return true;
        }
        match self.banned_until {
            Some(until) => now < until,
            None => false,
        }
    }
}

/// Authoritative record of an observed peer's behavior. `score` and
/// `trust_level` are derived fields, refreshed by [`crate::score::recompute`]
/// and never set directly by event handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: PeerId,
    pub address: Option<NetAddr>,
    /// ISO country code, when known. Populated externally (e.g. by a GeoIP
    /// lookup the hosting application performs); this crate never resolves
    /// it itself.
    pub country: Option<String>,
    pub score: Score,
    pub trust_level: TrustLevel,
    pub whitelisted: bool,
    #[serde(skip, default)]
    pub events: VecDeque<(Timestamp, PeerEventKind)>,
    pub counters: Counters,
    pub ban: BanInfo,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub connected_since: Option<Timestamp>,
    pub accumulated_connected_secs: u64,
    pub latency_ema_ms: Option<f64>,
    pub last_decay: Timestamp,
}

impl PeerRecord {
    pub fn new(id: PeerId, address: Option<NetAddr>, now: Timestamp) -> Self {
        Self {
            id,
            address,
            country: None,
            score: Score::default(),
            trust_level: TrustLevel::Medium,
            whitelisted: false,
            events: VecDeque::new(),
            counters: Counters::default(),
            ban: BanInfo::default(),
            first_seen: now,
            last_seen: now,
            connected_since: None,
            accumulated_connected_secs: 0,
            latency_ema_ms: None,
            last_decay: now,
        }
    }

    pub fn on_connected(&mut self, now: Timestamp) {
        self.connected_since = Some(now);
        self.last_seen = now;
    }

    pub fn on_disconnected(&mut self, now: Timestamp) {
        if let Some(since) = self.connected_since.take() {
            self.accumulated_connected_secs = self
                .accumulated_connected_secs
                .saturating_add(since.elapsed_since(now));
        }
        self.last_seen = now;
    }

    pub fn observe_latency_ms(&mut self, latency_ms: u64) {
        let sample = latency_ms as f64;
        self.latency_ema_ms = Some(match self.latency_ema_ms {
            Some(prev) => prev * 0.8 + sample * 0.2,
            None => sample,
        });
    }

    /// Applies an observed event to counters and the bounded event ring.
    /// Does not recompute `score` — callers invoke
    /// [`crate::score::recompute`] after applying events so score changes
    /// stay batched and deterministic per tick. A `(timestamp, kind)` pair
    /// already present in the ring is a duplicate delivery (e.g. a retried
    /// report of the same violation) and is skipped entirely, so replaying
    /// one is a no-op for both counters and score.
    pub fn apply_event(&mut self, now: Timestamp, kind: PeerEventKind) {
        self.last_seen = now;
        if self.events.iter().any(|(ts, k)| *ts == now && *k == kind) {
            return;
        }
        if self.events.len() >= EVENT_RING_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back((now, kind));

        match kind {
            PeerEventKind::ValidMessage => {
                self.counters.valid_msgs = self.counters.valid_msgs.saturating_add(1);
                self.counters.msg_validity_bonus =
                    (self.counters.msg_validity_bonus + 0.1).min(MSG_VALIDITY_BONUS_CAP);
            }
            PeerEventKind::BlockPropagated { fast } => {
                self.counters.blocks_total = self.counters.blocks_total.saturating_add(1);
                if fast {
                    self.counters.blocks_fast = self.counters.blocks_fast.saturating_add(1);
                }
            }
            _ => {
                self.counters.invalid_msgs = self.counters.invalid_msgs.saturating_add(1);
            }
        }
    }

    /// Sum of violation severities for events within the sliding window
    /// ending at `now`.
    pub fn windowed_violation_points(&self, now: Timestamp) -> f64 {
        let window_start = now.sub_secs(VIOLATION_WINDOW_SECS);
        self.events
            .iter()
            .filter(|(ts, _)| *ts >= window_start)
            .filter_map(|(_, kind)| kind.violation_severity())
            .sum()
    }

    pub fn uptime_ratio(&self, now: Timestamp) -> f64 {
        let total_secs = self.first_seen.elapsed_since(now).max(1);
        let mut connected = self.accumulated_connected_secs;
        if let Some(since) = self.connected_since {
            connected = connected.saturating_add(since.elapsed_since(now));
        }
        (connected as f64 / total_secs as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(b: u8) -> PeerId {
        PeerId::new([b; 32])
    }

    #[test]
    fn double_sign_is_flagged_for_immediate_permanent_ban() {
        assert!(PeerEventKind::DoubleSign.triggers_immediate_permanent_ban());
        assert!(!PeerEventKind::ProtocolViolation.triggers_immediate_permanent_ban());
    }

    #[test]
    fn windowed_violations_expire_outside_window() {
        let mut rec = PeerRecord::new(pid(1), None, Timestamp::new(0));
        rec.apply_event(Timestamp::new(0), PeerEventKind::Spam);
        assert_eq!(rec.windowed_violation_points(Timestamp::new(100)), 10.0);
        assert_eq!(rec.windowed_violation_points(Timestamp::new(4000)), 0.0);
    }

    #[test]
    fn trust_level_bands_match_config_defaults() {
        let config = ReputationConfig::default();
        assert_eq!(
            TrustLevel::from_score(10.0, false, &config),
            TrustLevel::Untrusted
        );
        assert_eq!(
            TrustLevel::from_score(40.0, false, &config),
            TrustLevel::Low
        );
        assert_eq!(
            TrustLevel::from_score(60.0, false, &config),
            TrustLevel::Medium
        );
        assert_eq!(
            TrustLevel::from_score(90.0, false, &config),
            TrustLevel::High
        );
        assert_eq!(
            TrustLevel::from_score(5.0, true, &config),
            TrustLevel::Whitelisted
        );
    }

    #[test]
    fn ban_info_reflects_active_window() {
        let mut ban = BanInfo::default();
        ban.banned_until = Some(Timestamp::new(100));
        assert!(ban.is_banned_at(Timestamp::new(50)));
        assert!(!ban.is_banned_at(Timestamp::new(200)));
    }
}
