//! Per-peer reliability tracking: an EMA over request outcomes, combining
//! success, latency-vs-budget, and correctness into a single `[0, 1]`
//! score used to pick request targets.

use std::collections::HashMap;
use std::time::Duration;

use p2p_types::PeerId;
use parking_lot::RwLock;

const EMA_ALPHA: f64 = 0.2;
/// Score assigned to a peer with no history yet, so new connections get a
/// chance to prove themselves rather than being starved by the floor.
const INITIAL_RELIABILITY: f64 = 0.6;

#[derive(Default)]
pub struct ReliabilityTracker {
    scores: RwLock<HashMap<PeerId, f64>>,
}

impl ReliabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score_of(&self, peer: &PeerId) -> f64 {
        self.scores.read().get(peer).copied().unwrap_or(INITIAL_RELIABILITY)
    }

    fn update(&self, peer: PeerId, sample: f64) {
        let mut scores = self.scores.write();
        let prev = scores.get(&peer).copied().unwrap_or(INITIAL_RELIABILITY);
        let next = EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * prev;
        scores.insert(peer, next.clamp(0.0, 1.0));
    }

    /// A request completed successfully within `elapsed` against a
    /// `budget`; faster-than-budget responses score higher.
    pub fn record_success(&self, peer: PeerId, elapsed: Duration, budget: Duration) {
        let latency_score = if budget.is_zero() {
            1.0
        } else {
            (1.0 - (elapsed.as_secs_f64() / budget.as_secs_f64())).clamp(0.0, 1.0)
        };
        // Weighted toward having succeeded at all; latency is a tiebreaker.
        let sample = 0.7 + 0.3 * latency_score;
        self.update(peer, sample);
    }

    /// A request timed out, was reassigned, or the peer returned an
    /// invalid/malformed payload.
    pub fn record_failure(&self, peer: PeerId) {
        self.update(peer, 0.0);
    }

    pub fn remove(&self, peer: &PeerId) {
        self.scores.write().remove(peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_peer_starts_above_the_default_floor() {
        let tracker = ReliabilityTracker::new();
        assert!(tracker.score_of(&PeerId::new([1; 32])) > 0.3);
    }

    #[test]
    fn repeated_failures_drive_score_toward_zero() {
        let tracker = ReliabilityTracker::new();
        let peer = PeerId::new([1; 32]);
        for _ in 0..20 {
            tracker.record_failure(peer);
        }
        assert!(tracker.score_of(&peer) < 0.05);
    }

    #[test]
    fn fast_successes_drive_score_toward_one() {
        let tracker = ReliabilityTracker::new();
        let peer = PeerId::new([2; 32]);
        for _ in 0..30 {
            tracker.record_success(peer, Duration::from_millis(10), Duration::from_secs(10));
        }
        assert!(tracker.score_of(&peer) > 0.95);
    }

    #[test]
    fn a_failure_after_successes_pulls_the_score_down() {
        let tracker = ReliabilityTracker::new();
        let peer = PeerId::new([3; 32]);
        for _ in 0..10 {
            tracker.record_success(peer, Duration::from_millis(10), Duration::from_secs(10));
        }
        let before = tracker.score_of(&peer);
        tracker.record_failure(peer);
        assert!(tracker.score_of(&peer) < before);
    }
}
