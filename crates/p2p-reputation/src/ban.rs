use p2p_types::Timestamp;

use crate::config::ReputationConfig;
use crate::record::{BanInfo, PeerRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanOutcome {
    /// Peer was not banned (whitelisted, or already permanently banned).
    NoOp,
    TemporarilyBanned,
    PermanentlyBanned,
}

/// Permanently bans a peer immediately, bypassing the escalation ladder.
/// Used for the DoubleSign trigger. Whitelisted peers are immune.
pub fn ban_permanently(record: &mut PeerRecord, reason: impl Into<String>) -> BanOutcome {
    if record.whitelisted {
        return BanOutcome::NoOp;
    }
    record.ban.permanently_banned = true;
    record.ban.reason = Some(reason.into());
    record.ban.banned_until = None;
    BanOutcome::PermanentlyBanned
}

/// Applies the next step of the temporary-ban ladder. Duration doubles each
/// occurrence (per [`ReputationConfig::temp_ban_duration`]); once the
/// occurrence count exceeds `max_temp_bans_before_permanent`, the ban
/// converts to permanent instead. Whitelisted peers are immune.
pub fn ban_temporarily(
    record: &mut PeerRecord,
    now: Timestamp,
    reason: impl Into<String>,
    config: &ReputationConfig,
) -> BanOutcome {
    if record.whitelisted {
        return BanOutcome::NoOp;
    }
    if record.ban.permanently_banned {
        return BanOutcome::NoOp;
    }

    let reason = reason.into();
    record.ban.temp_count = record.ban.temp_count.saturating_add(1);

    if record.ban.temp_count > config.max_temp_bans_before_permanent {
        return ban_permanently(record, reason);
    }

    let duration = config.temp_ban_duration(record.ban.temp_count);
    record.ban.banned_until = Some(now.add_secs(duration.as_secs()));
    record.ban.reason = Some(reason);
    BanOutcome::TemporarilyBanned
}

pub fn clear_ban(record: &mut PeerRecord) {
    record.ban = BanInfo::default();
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2p_types::PeerId;

    fn pid(b: u8) -> PeerId {
        PeerId::new([b; 32])
    }

    #[test]
    fn temp_ban_escalates_to_permanent_after_configured_count() {
        let config = ReputationConfig::default();
        let mut rec = PeerRecord::new(pid(1), None, Timestamp::new(0));

        assert_eq!(
            ban_temporarily(&mut rec, Timestamp::new(0), "invalid", &config),
            BanOutcome::TemporarilyBanned
        );
        assert_eq!(
            ban_temporarily(&mut rec, Timestamp::new(1), "invalid", &config),
            BanOutcome::TemporarilyBanned
        );
        assert_eq!(
            ban_temporarily(&mut rec, Timestamp::new(2), "invalid", &config),
            BanOutcome::TemporarilyBanned
        );
        // Fourth qualifying offense converts to permanent.
        assert_eq!(
            ban_temporarily(&mut rec, Timestamp::new(3), "invalid", &config),
            BanOutcome::PermanentlyBanned
        );
        assert!(rec.ban.permanently_banned);
    }

    #[test]
    fn whitelisted_peer_is_immune() {
        let config = ReputationConfig::default();
        let mut rec = PeerRecord::new(pid(1), None, Timestamp::new(0));
        rec.whitelisted = true;
        assert_eq!(
            ban_temporarily(&mut rec, Timestamp::new(0), "x", &config),
            BanOutcome::NoOp
        );
        assert_eq!(
            ban_permanently(&mut rec, "x"),
            BanOutcome::NoOp
        );
    }

    #[test]
    fn double_sign_bans_permanently_immediately() {
        let mut rec = PeerRecord::new(pid(1), None, Timestamp::new(0));
        assert_eq!(
            ban_permanently(&mut rec, "double sign"),
            BanOutcome::PermanentlyBanned
        );
        assert!(rec.ban.permanently_banned);
    }
}
