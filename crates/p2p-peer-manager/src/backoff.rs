use std::time::Duration;

use rand::Rng;

use crate::config::PeerManagerConfig;

/// Per-peer reconnect backoff state for persistent peers: doubles on every
/// failed dial, resets on success, capped and jittered so a large fleet of
/// peers reconnecting after a shared outage doesn't thunder all at once.
#[derive(Debug, Clone, Default)]
pub struct ReconnectBackoff {
    failures: u32,
}

impl ReconnectBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Next delay before redialing, with jitter applied by `rng`.
    pub fn next_delay(&self, config: &PeerManagerConfig, rng: &mut impl Rng) -> Duration {
        let base = config.reconnect_backoff_base.as_secs_f64();
        let cap = config.reconnect_backoff_cap.as_secs_f64();
        let scaled = base * 2f64.powi(self.failures as i32);
        let bounded = scaled.min(cap);
        let jitter_span = bounded * config.reconnect_jitter;
        let jitter = rng.gen_range(-jitter_span..=jitter_span);
        Duration::from_secs_f64((bounded + jitter).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn delay_doubles_then_caps() {
        let config = PeerManagerConfig::default();
        let mut backoff = ReconnectBackoff::new();
        let mut rng = StdRng::seed_from_u64(1);

        let first = backoff.next_delay(&config, &mut rng).as_secs_f64();
        assert!((first - 2.0).abs() < 2.0 * config.reconnect_jitter);

        for _ in 0..20 {
            backoff.record_failure();
        }
        let capped = backoff.next_delay(&config, &mut rng).as_secs_f64();
        let cap = config.reconnect_backoff_cap.as_secs_f64();
        assert!(capped <= cap * (1.0 + config.reconnect_jitter) + 0.001);
    }

    #[test]
    fn success_resets_failure_count() {
        let config = PeerManagerConfig::default();
        let mut backoff = ReconnectBackoff::new();
        let mut rng = StdRng::seed_from_u64(2);
        backoff.record_failure();
        backoff.record_failure();
        backoff.record_success();
        let delay = backoff.next_delay(&config, &mut rng).as_secs_f64();
        assert!((delay - 2.0).abs() < 2.0 * config.reconnect_jitter);
    }
}
