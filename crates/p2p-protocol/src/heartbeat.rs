//! Ping/pong liveness payload and per-peer outstanding-ping tracking.

use p2p_types::Timestamp;

/// `Ping`/`Pong` payload: an 8-byte nonce the pong must echo back.
pub fn encode_nonce(nonce: u64) -> Vec<u8> {
    nonce.to_le_bytes().to_vec()
}

pub fn decode_nonce(buf: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = buf.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(arr))
}

/// Tracks the single outstanding ping for a connection. A connection never
/// has more than one ping in flight: a new ping is only sent after the
/// previous one resolved (pong received or timed out).
#[derive(Debug, Default)]
pub struct PingState {
    outstanding: Option<(u64, Timestamp)>,
}

impl PingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, nonce: u64, now: Timestamp) {
        self.outstanding = Some((nonce, now));
    }

    /// Resolves the outstanding ping if `nonce` matches. Returns `true` on
    /// a matching pong.
    pub fn resolve(&mut self, nonce: u64) -> bool {
        if self.outstanding.map(|(n, _)| n) == Some(nonce) {
            self.outstanding = None;
            true
        } else {
            false
        }
    }

    /// Whether the outstanding ping (if any) has exceeded `timeout`.
    pub fn is_overdue(&self, now: Timestamp, timeout_secs: u64) -> bool {
        self.outstanding
            .map(|(_, sent_at)| now.elapsed_since(sent_at) >= timeout_secs)
            .unwrap_or(false)
    }

    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_round_trips() {
        let bytes = encode_nonce(0xDEADBEEF);
        assert_eq!(decode_nonce(&bytes), Some(0xDEADBEEF));
    }

    #[test]
    fn matching_pong_resolves_ping() {
        let mut state = PingState::new();
        state.send(1, Timestamp::new(0));
        assert!(state.resolve(1));
        assert!(!state.has_outstanding());
    }

    #[test]
    fn mismatched_nonce_does_not_resolve() {
        let mut state = PingState::new();
        state.send(1, Timestamp::new(0));
        assert!(!state.resolve(2));
        assert!(state.has_outstanding());
    }

    #[test]
    fn overdue_ping_is_detected() {
        let mut state = PingState::new();
        state.send(1, Timestamp::new(0));
        assert!(!state.is_overdue(Timestamp::new(5), 10));
        assert!(state.is_overdue(Timestamp::new(15), 10));
    }
}
