use std::collections::{HashMap, HashSet, VecDeque};

use p2p_types::{NetAddr, PeerId, Timestamp};

use crate::config::ReputationConfig;
use crate::record::PeerRecord;

/// Tracks live subnet/ASN occupancy and the new-subnet admission rate so
/// [`should_accept`] can enforce Sybil quotas without the Reputation
/// component depending on Peer Manager's connection table.
#[derive(Debug, Default)]
pub struct AdmissionTracker {
    subnet_counts: HashMap<Vec<u8>, usize>,
    asn_counts: HashMap<u32, usize>,
    seen_subnets: HashSet<Vec<u8>>,
    new_subnet_admissions: VecDeque<Timestamp>,
}

impl AdmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected(&mut self, addr: &NetAddr, asn: Option<u32>) {
        *self.subnet_counts.entry(addr.ip.subnet_key()).or_insert(0) += 1;
        if let Some(asn) = asn {
            *self.asn_counts.entry(asn).or_insert(0) += 1;
        }
    }

    pub fn on_disconnected(&mut self, addr: &NetAddr, asn: Option<u32>) {
        if let Some(count) = self.subnet_counts.get_mut(&addr.ip.subnet_key()) {
            *count = count.saturating_sub(1);
        }
        if let Some(asn) = asn {
            if let Some(count) = self.asn_counts.get_mut(&asn) {
                *count = count.saturating_sub(1);
            }
        }
    }

    fn subnet_count(&self, addr: &NetAddr) -> usize {
        self.subnet_counts
            .get(&addr.ip.subnet_key())
            .copied()
            .unwrap_or(0)
    }

    fn asn_count(&self, asn: u32) -> usize {
        self.asn_counts.get(&asn).copied().unwrap_or(0)
    }

    /// Records (if novel) that `addr`'s subnet was just admitted, pruning
    /// entries older than one hour from the rolling window.
    fn record_new_subnet_if_needed(&mut self, addr: &NetAddr, now: Timestamp) {
        let key = addr.ip.subnet_key();
        if self.seen_subnets.insert(key) {
            self.new_subnet_admissions.push_back(now);
        }
        let window_start = now.sub_secs(3600);
        while matches!(self.new_subnet_admissions.front(), Some(ts) if *ts < window_start) {
            self.new_subnet_admissions.pop_front();
        }
    }

    fn new_subnet_admissions_in_window(&self, now: Timestamp) -> usize {
        let window_start = now.sub_secs(3600);
        self.new_subnet_admissions
            .iter()
            .filter(|ts| **ts >= window_start)
            .count()
    }
}

/// Authoritative accept/reject decision for a dial or inbound accept,
/// consulted by Peer Manager before admitting any connection.
pub fn should_accept(
    record: Option<&PeerRecord>,
    addr: &NetAddr,
    asn: Option<u32>,
    now: Timestamp,
    tracker: &mut AdmissionTracker,
    config: &ReputationConfig,
) -> (bool, String) {
    if let Some(record) = record {
        if record.ban.permanently_banned {
            return (false, "permanently banned".to_string());
        }
        if record.ban.is_banned_at(now) {
            return (false, "temporarily banned".to_string());
        }
        if !record.whitelisted && record.score.value() < config.connect_score_threshold {
            return (false, "score below connect threshold".to_string());
        }
    }

    if tracker.subnet_count(addr) + 1 > config.max_peers_per_subnet {
        return (false, "subnet quota exceeded".to_string());
    }

    if let Some(asn) = asn {
        if tracker.asn_count(asn) + 1 > config.max_peers_per_asn {
            return (false, "asn quota exceeded".to_string());
        }
    }

    let is_novel_subnet = !tracker.seen_subnets.contains(&addr.ip.subnet_key());
    if is_novel_subnet
        && tracker.new_subnet_admissions_in_window(now) >= config.max_new_peers_per_hour
    {
        return (false, "new subnet admission rate exceeded".to_string());
    }

    tracker.record_new_subnet_if_needed(addr, now);
    (true, String::new())
}

#[derive(Debug, Clone)]
pub struct DiverseCandidate {
    pub id: PeerId,
    pub country: Option<String>,
    pub score: f64,
}

/// Fallback cap on total peers returned when diversity can't be enforced
/// (fewer than `diverse_min_countries` distinct countries among the
/// candidates) — picking all `k` from a single country would hand an
/// attacker controlling that country's address space a majority view.
const UNDIVERSIFIABLE_SELECTION_CAP: usize = 3;

/// Returns up to `k` peers, preferring higher-scoring peers while enforcing
/// no more than `diverse_max_fraction_per_country` from a single country
/// (when `diverse_min_countries` distinct countries are available among the
/// candidates). When diversity can't be enforced, the total returned is
/// capped at [`UNDIVERSIFIABLE_SELECTION_CAP`] instead of `k`.
pub fn select_diverse_peers(
    mut candidates: Vec<DiverseCandidate>,
    k: usize,
    config: &ReputationConfig,
) -> Vec<PeerId> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let distinct_countries: HashSet<&str> = candidates
        .iter()
        .filter_map(|c| c.country.as_deref())
        .collect();
    let enforce_diversity = distinct_countries.len() >= config.diverse_min_countries;

    let limit = if enforce_diversity {
        k
    } else {
        k.min(UNDIVERSIFIABLE_SELECTION_CAP)
    };
    let max_per_country = if enforce_diversity {
        ((k as f64) * config.diverse_max_fraction_per_country).floor() as usize
    } else {
        limit
    };

    let mut selected = Vec::with_capacity(limit.min(candidates.len()));
    let mut per_country: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        if selected.len() >= limit {
            break;
        }
        if enforce_diversity {
            if let Some(country) = &candidate.country {
                let count = per_country.entry(country.clone()).or_insert(0);
                if *count >= max_per_country.max(1) {
                    continue;
                }
                *count += 1;
            }
        }
        selected.push(candidate.id);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2p_types::IpAddr;

    fn addr(a: u8, b: u8, c: u8, d: u8) -> NetAddr {
        NetAddr::new(IpAddr::v4(a, b, c, d), 9000)
    }

    #[test]
    fn subnet_cap_denies_third_peer() {
        let config = ReputationConfig {
            max_peers_per_subnet: 2,
            ..ReputationConfig::default()
        };
        let mut tracker = AdmissionTracker::new();
        let now = Timestamp::new(0);

        tracker.on_connected(&addr(10, 1, 2, 1), None);
        tracker.on_connected(&addr(10, 1, 2, 2), None);

        let (allowed, reason) =
            should_accept(None, &addr(10, 1, 2, 3), None, now, &mut tracker, &config);
        assert!(!allowed);
        assert!(reason.contains("subnet"));
    }

    #[test]
    fn eclipse_resistance_caps_single_country() {
        let config = ReputationConfig::default();
        let mut candidates = Vec::new();
        for i in 0..20u8 {
            candidates.push(DiverseCandidate {
                id: PeerId::new([i; 32]),
                country: Some("CN".to_string()),
                score: 50.0,
            });
        }
        // Only country present: diversity not enforceable, so total is
        // capped at the fixed fallback bound rather than `k`.
        let selected = select_diverse_peers(candidates.clone(), 10, &config);
        assert!(selected.len() <= 3);

        // Add three more countries so diversity kicks in.
        for (i, country) in ["US", "DE", "JP"].iter().enumerate() {
            candidates.push(DiverseCandidate {
                id: PeerId::new([100 + i as u8; 32]),
                country: Some(country.to_string()),
                score: 50.0,
            });
        }
        let selected = select_diverse_peers(candidates, 10, &config);
        let cn_count = selected
            .iter()
            .filter(|id| id.as_bytes()[0] < 20)
            .count();
        assert!(cn_count <= 4);
    }
}
