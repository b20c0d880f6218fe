use p2p_types::{Score, Timestamp};

use crate::config::ReputationConfig;
use crate::record::{PeerRecord, TrustLevel};

fn uptime_subscore(record: &PeerRecord, now: Timestamp) -> f64 {
    let observed_secs = record.first_seen.elapsed_since(now);
    let raw = record.uptime_ratio(now) * 100.0;
    // Smooth toward neutral during the first observed hour so a single
    // successful handshake does not immediately read as "always up".
    let smoothing = (observed_secs as f64 / 3600.0).min(1.0);
    raw * smoothing + 50.0 * (1.0 - smoothing)
}

fn message_validity_subscore(record: &PeerRecord) -> f64 {
    let valid = record.counters.valid_msgs as f64;
    let invalid = record.counters.invalid_msgs as f64;
    let total = valid + invalid;
    if total == 0.0 {
        return 100.0;
    }
    let ratio = valid / total;
    let mut base = ratio * 100.0;
    if ratio < 0.8 {
        let deficit = 0.8 - ratio;
        base -= deficit * deficit * 200.0;
    } else if ratio >= 0.95 {
        base = (base + record.counters.msg_validity_bonus).min(100.0);
    }
    base.clamp(0.0, 100.0)
}

fn latency_subscore(record: &PeerRecord) -> f64 {
    match record.latency_ema_ms {
        None => 100.0,
        Some(ms) => {
            if ms <= 500.0 {
                100.0
            } else if ms >= 5000.0 {
                0.0
            } else {
                100.0 * (5000.0 - ms) / (5000.0 - 500.0)
            }
        }
    }
}

fn block_propagation_subscore(record: &PeerRecord) -> f64 {
    if record.counters.blocks_total == 0 {
        return 50.0;
    }
    (record.counters.blocks_fast as f64 / record.counters.blocks_total as f64) * 100.0
}

fn violations_penalty(record: &PeerRecord, now: Timestamp) -> f64 {
    record.windowed_violation_points(now).min(100.0)
}

/// Recomputes `score` and `trust_level` from current counters and event
/// history. Applying the same event twice with the same timestamp changes
/// nothing here beyond what `apply_event` already deduplicated via its
/// windowed sum, so calling this repeatedly with no new events is a no-op.
pub fn recompute(record: &mut PeerRecord, now: Timestamp, config: &ReputationConfig) {
    let uptime = uptime_subscore(record, now);
    let validity = message_validity_subscore(record);
    let latency = latency_subscore(record);
    let block_prop = block_propagation_subscore(record);
    let violations = violations_penalty(record, now);

    let raw = config.weight_uptime * uptime
        + config.weight_msg_validity * validity
        + config.weight_latency * latency
        + config.weight_block_prop * block_prop
        - config.weight_violations * violations;

    record.score = Score::new(raw);
    record.trust_level = TrustLevel::from_score(record.score.value(), record.whitelisted, config);
}

/// Ratchets `score` 1% toward the neutral baseline, applied only when the
/// peer has had no events since the last decay tick; never crosses the
/// neutral value.
pub fn decay(record: &mut PeerRecord, now: Timestamp, config: &ReputationConfig) {
    let has_recent_event = record
        .events
        .back()
        .map(|(ts, _)| *ts > record.last_decay)
        .unwrap_or(false);
    if has_recent_event {
        record.last_decay = now;
        return;
    }

    let current = record.score.value();
    let neutral = config.decay_neutral;
    let next = current + (neutral - current) * config.decay_rate;
    record.score = Score::new(next);
    record.trust_level = TrustLevel::from_score(record.score.value(), record.whitelisted, config);
    record.last_decay = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PeerEventKind;
    use p2p_types::PeerId;

    fn pid(b: u8) -> PeerId {
        PeerId::new([b; 32])
    }

    #[test]
    fn score_stays_in_bounds() {
        let config = ReputationConfig::for_testing();
        let mut rec = PeerRecord::new(pid(1), None, Timestamp::new(0));
        for _ in 0..50 {
            rec.apply_event(Timestamp::new(0), PeerEventKind::DoubleSign);
        }
        recompute(&mut rec, Timestamp::new(10), &config);
        assert!(rec.score.value() >= 0.0 && rec.score.value() <= 100.0);
    }

    #[test]
    fn decay_never_crosses_neutral() {
        let config = ReputationConfig::for_testing();
        let mut rec = PeerRecord::new(pid(1), None, Timestamp::new(0));
        rec.score = Score::new(90.0);
        rec.last_decay = Timestamp::new(0);
        for t in 1..2000u64 {
            decay(&mut rec, Timestamp::new(t), &config);
        }
        assert!(rec.score.value() >= config.decay_neutral - 0.001);
    }

    #[test]
    fn decay_skips_peers_with_recent_events() {
        let config = ReputationConfig::for_testing();
        let mut rec = PeerRecord::new(pid(1), None, Timestamp::new(0));
        rec.score = Score::new(90.0);
        rec.last_decay = Timestamp::new(0);
        rec.apply_event(Timestamp::new(5), PeerEventKind::ValidMessage);
        decay(&mut rec, Timestamp::new(10), &config);
        assert_eq!(rec.score.value(), 90.0);
    }

    #[test]
    fn repeated_identical_event_timestamp_is_idempotent_for_score() {
        let config = ReputationConfig::for_testing();
        let mut a = PeerRecord::new(pid(1), None, Timestamp::new(0));
        let mut b = PeerRecord::new(pid(1), None, Timestamp::new(0));
        a.apply_event(Timestamp::new(5), PeerEventKind::ValidMessage);
        a.apply_event(Timestamp::new(5), PeerEventKind::ValidMessage);
        b.apply_event(Timestamp::new(5), PeerEventKind::ValidMessage);
        recompute(&mut a, Timestamp::new(5), &config);
        recompute(&mut b, Timestamp::new(5), &config);
        assert_eq!(a.counters.valid_msgs, b.counters.valid_msgs);
        assert_eq!(a.score.value(), b.score.value());
    }
}
