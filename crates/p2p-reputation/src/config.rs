use std::time::Duration;

/// Every tunable named in the reputation section of the configuration
/// surface, plus the score-formula weights. Defaults match the literal
/// values called out by the component design.
#[derive(Debug, Clone)]
pub struct ReputationConfig {
    // --- score formula weights (must sum to 1.0) ---
    pub weight_uptime: f64,
    pub weight_msg_validity: f64,
    pub weight_latency: f64,
    pub weight_block_prop: f64,
    pub weight_violations: f64,

    // --- trust level bands ---
    pub untrusted_below: f64,
    pub low_below: f64,
    pub medium_below: f64,

    // --- admission ---
    pub connect_score_threshold: f64,
    pub max_peers_per_subnet: usize,
    pub max_peers_per_asn: usize,
    pub max_new_peers_per_hour: usize,

    // --- eclipse resistance ---
    pub diverse_max_fraction_per_country: f64,
    pub diverse_min_countries: usize,

    // --- bans ---
    pub temp_ban_durations: Vec<Duration>,
    pub max_temp_bans_before_permanent: u32,

    // --- decay ---
    pub decay_interval: Duration,
    pub decay_rate: f64,
    pub decay_neutral: f64,

    // --- persistence ---
    pub flush_interval: Duration,

    // --- whitelist ---
    pub whitelist: Vec<p2p_types::PeerId>,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            weight_uptime: 0.25,
            weight_msg_validity: 0.30,
            weight_latency: 0.20,
            weight_block_prop: 0.15,
            weight_violations: 0.10,

            untrusted_below: 20.0,
            low_below: 50.0,
            medium_below: 75.0,

            connect_score_threshold: 30.0,
            max_peers_per_subnet: 10,
            max_peers_per_asn: 15,
            max_new_peers_per_hour: 50,

            diverse_max_fraction_per_country: 0.40,
            diverse_min_countries: 3,

            temp_ban_durations: vec![
                Duration::from_secs(3600),
                Duration::from_secs(7200),
                Duration::from_secs(14400),
                Duration::from_secs(28800),
            ],
            max_temp_bans_before_permanent: 3,

            decay_interval: Duration::from_secs(3600),
            decay_rate: 0.01,
            decay_neutral: 50.0,

            flush_interval: Duration::from_secs(30),

            whitelist: Vec::new(),
        }
    }
}

impl ReputationConfig {
    /// Compressed windows for tests: same weights and thresholds, but
    /// seconds instead of hours so unit tests don't need to fast-forward a
    /// simulated clock by days.
    pub fn for_testing() -> Self {
        Self {
            temp_ban_durations: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ],
            decay_interval: Duration::from_secs(1),
            flush_interval: Duration::from_millis(50),
            ..Self::default()
        }
    }

    /// Duration for the Nth (1-indexed) temporary ban; saturates at the
    /// longest configured duration once the list is exhausted.
    pub fn temp_ban_duration(&self, occurrence: u32) -> Duration {
        let idx = (occurrence.saturating_sub(1)) as usize;
        self.temp_ban_durations
            .get(idx)
            .copied()
            .unwrap_or_else(|| *self.temp_ban_durations.last().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let c = ReputationConfig::default();
        let sum = c.weight_uptime
            + c.weight_msg_validity
            + c.weight_latency
            + c.weight_block_prop
            + c.weight_violations;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn temp_ban_duration_doubles_then_saturates() {
        let c = ReputationConfig::default();
        assert_eq!(c.temp_ban_duration(1), Duration::from_secs(3600));
        assert_eq!(c.temp_ban_duration(2), Duration::from_secs(7200));
        assert_eq!(c.temp_ban_duration(4), Duration::from_secs(28800));
        assert_eq!(c.temp_ban_duration(10), Duration::from_secs(28800));
    }
}
