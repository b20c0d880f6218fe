//! Token-bucket rate limiting, one bucket per metered dimension per peer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::config::ProtocolConfig;

/// Token bucket: tokens are added at `refill_rate` per second, capped at
/// `capacity`; each call to [`RateLimiter::try_acquire`] spends `cost`
/// tokens or is rejected outright.
pub struct RateLimiter {
    capacity: u64,
    refill_rate: u64,
    tokens: AtomicU64,
    last_refill: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(capacity: u64, refill_rate: u64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: AtomicU64::new(capacity),
            last_refill: Mutex::new(Instant::now()),
        }
    }

    pub fn try_acquire(&self, cost: u64) -> bool {
        self.refill();
        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            if current < cost {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - cost, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn refill(&self) {
        let mut last = self.last_refill.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(*last);
        let tokens_to_add = (elapsed.as_secs_f64() * self.refill_rate as f64) as u64;
        if tokens_to_add > 0 {
            *last = now;
            loop {
                let current = self.tokens.load(Ordering::Relaxed);
                let new_value = current.saturating_add(tokens_to_add).min(self.capacity);
                if self
                    .tokens
                    .compare_exchange(current, new_value, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    break;
                }
            }
        }
    }

    pub fn available(&self) -> u64 {
        self.refill();
        self.tokens.load(Ordering::Relaxed)
    }
}

/// Which limiter a rejected message should be attributed to, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterKind {
    Blocks,
    Tx,
    Overall,
    Bytes,
}

/// The full set of per-peer limiters consulted on every inbound message:
/// a class-specific bucket (blocks or txs), the overall message-rate
/// bucket, and a byte-rate bucket. All must pass for the message to run.
pub struct PeerRateLimiters {
    blocks: RateLimiter,
    tx: RateLimiter,
    overall: RateLimiter,
    bytes: RateLimiter,
}

impl PeerRateLimiters {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            blocks: RateLimiter::new(config.rate_max_blocks_per_sec, config.rate_max_blocks_per_sec),
            tx: RateLimiter::new(config.rate_max_tx_per_sec, config.rate_max_tx_per_sec),
            overall: RateLimiter::new(config.rate_max_msgs_per_sec, config.rate_max_msgs_per_sec),
            bytes: RateLimiter::new(config.rate_max_bytes_per_sec, config.rate_max_bytes_per_sec),
        }
    }

    /// Checks every applicable bucket for a message of `class` and
    /// `byte_len`. Returns the first limiter that rejected it, if any.
    pub fn check(&self, class: Option<p2p_types::GossipClass>, byte_len: u64) -> Result<(), LimiterKind> {
        if !self.overall.try_acquire(1) {
            return Err(LimiterKind::Overall);
        }
        if !self.bytes.try_acquire(byte_len) {
            return Err(LimiterKind::Bytes);
        }
        match class {
            Some(p2p_types::GossipClass::Block) if !self.blocks.try_acquire(1) => Err(LimiterKind::Blocks),
            Some(p2p_types::GossipClass::Tx) if !self.tx.try_acquire(1) => Err(LimiterKind::Tx),
            _ => Ok(()),
        }
    }
}
