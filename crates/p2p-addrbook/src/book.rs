use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::OnceLock;

use p2p_types::{NetAddr, PeerAddress, PeerId, PeerSource, Timestamp};
use rand::Rng;

use crate::config::AddressBookConfig;
use crate::errors::AddressBookError;
use crate::table::AddressTable;

static BUCKET_HASH_KEY: OnceLock<RandomState> = OnceLock::new();

/// Hashes a value with a process-randomized key so bucket placement cannot
/// be predicted by a peer trying to target a specific bucket. The key is
/// drawn from OS randomness once per process and shared by every call, so
/// placement stays consistent within a run but varies across runs.
fn secure_bucket_hash<T: Hash>(t: &T) -> u64 {
    let state = BUCKET_HASH_KEY.get_or_init(RandomState::new);
    let mut s = state.build_hasher();
    t.hash(&mut s);
    s.finish()
}

#[derive(Debug, Clone, Default)]
pub struct AddressBookStats {
    pub new_count: usize,
    pub tried_count: usize,
}

/// New/Tried bucketed address book. Addresses learned from gossip or seeds
/// live in the New table until a successful handshake promotes them to
/// Tried; per-subnet caps on both tables bound how much of the book a
/// single network range can occupy.
pub struct AddressBook {
    new_table: AddressTable,
    tried_table: AddressTable,
    config: AddressBookConfig,
    self_id: PeerId,
}

impl AddressBook {
    pub fn new(config: AddressBookConfig, self_id: PeerId) -> Self {
        Self {
            new_table: AddressTable::new(config.new_bucket_count),
            tried_table: AddressTable::new(config.tried_bucket_count),
            config,
            self_id,
        }
    }

    /// Learns of an address from `source_addr` (the peer that told us about
    /// it, used only to key New-table bucket placement). Returns `Ok(false)`
    /// without error when the address is already known or is rejected by a
    /// subnet cap — neither is exceptional.
    pub fn add(
        &mut self,
        id: PeerId,
        addr: NetAddr,
        source: PeerSource,
        source_addr: &NetAddr,
        now: Timestamp,
    ) -> Result<bool, AddressBookError> {
        if id == self.self_id {
            return Err(AddressBookError::SelfAddress);
        }
        if !addr.is_routable() {
            return Err(AddressBookError::NotRoutable);
        }
        if self.new_table.contains(&id) || self.tried_table.contains(&id) {
            self.new_table.touch(&id, now);
            self.tried_table.touch(&id, now);
            return Ok(false);
        }

        let addr_subnet = addr.ip.subnet_key();
        let total = self.new_table.subnet_totals.get(&addr_subnet).copied().unwrap_or(0)
            + self.tried_table.subnet_totals.get(&addr_subnet).copied().unwrap_or(0);
        if total >= self.config.max_per_subnet_total {
            return Ok(false);
        }

        let source_subnet = source_addr.ip.subnet_key();
        let bucket_idx = self.new_bucket_index(&source_subnet, &addr_subnet);
        let bucket = &mut self.new_table.buckets[bucket_idx];
        if !bucket.can_accept(&addr_subnet, &self.config) {
            return Ok(false);
        }

        bucket.add(PeerAddress::new(id, addr, source, now));
        *self.new_table.subnet_totals.entry(addr_subnet).or_insert(0) += 1;
        self.new_table.id_to_bucket.insert(id, bucket_idx);
        Ok(true)
    }

    /// Records a failed dial attempt; leaves the address in whichever table
    /// it is currently in.
    pub fn mark_attempt(&mut self, id: &PeerId, now: Timestamp) {
        for table in [&mut self.new_table, &mut self.tried_table] {
            let Some(&idx) = table.id_to_bucket.get(id) else {
                continue;
            };
            let Some(mut entry) = table.buckets[idx].remove(id) else {
                continue;
            };
            entry.mark_dial_failed(now);
            let subnet = entry.addr.ip.subnet_key();
            if let Some(count) = table.subnet_totals.get_mut(&subnet) {
                *count = count.saturating_sub(1);
            }
            if table.buckets[idx].can_accept(&subnet, &self.config) {
                table.buckets[idx].add(entry);
                *table.subnet_totals.entry(subnet).or_insert(0) += 1;
            } else {
                table.id_to_bucket.remove(id);
            }
            return;
        }
    }

    /// Promotes an address from New to Tried after a successful handshake,
    /// evicting the oldest Tried-bucket occupant if the target bucket is
    /// full and over its subnet cap.
    pub fn promote(&mut self, id: &PeerId, now: Timestamp) -> bool {
        let Some(&bucket_idx) = self.new_table.id_to_bucket.get(id) else {
            return self.tried_table.contains(id);
        };
        let Some(mut entry) = self.new_table.buckets[bucket_idx].remove(id) else {
            return false;
        };
        self.new_table.id_to_bucket.remove(id);
        let addr_subnet = entry.addr.ip.subnet_key();
        if let Some(count) = self.new_table.subnet_totals.get_mut(&addr_subnet) {
            *count = count.saturating_sub(1);
        }
        entry.mark_handshake_success(now);

        let tried_idx = self.tried_bucket_index(&addr_subnet);
        let tried_bucket = &mut self.tried_table.buckets[tried_idx];
        if !tried_bucket.can_accept(&addr_subnet, &self.config) {
            if let Some(evicted) = tried_bucket.evict_oldest() {
                let evicted_subnet = evicted.addr.ip.subnet_key();
                self.tried_table.id_to_bucket.remove(&evicted.id);
                if let Some(count) = self.tried_table.subnet_totals.get_mut(&evicted_subnet) {
                    *count = count.saturating_sub(1);
                }
            } else {
                return false;
            }
        }
        self.tried_table.buckets[tried_idx].add(entry);
        *self.tried_table.subnet_totals.entry(addr_subnet).or_insert(0) += 1;
        self.tried_table.id_to_bucket.insert(*id, tried_idx);
        true
    }

    pub fn remove(&mut self, id: &PeerId) -> bool {
        for table in [&mut self.new_table, &mut self.tried_table] {
            if let Some(&idx) = table.id_to_bucket.get(id) {
                if let Some(entry) = table.buckets[idx].remove(id) {
                    table.id_to_bucket.remove(id);
                    let subnet = entry.addr.ip.subnet_key();
                    if let Some(count) = table.subnet_totals.get_mut(&subnet) {
                        *count = count.saturating_sub(1);
                    }
                    return true;
                }
            }
        }
        false
    }

    pub fn get_address(&self, id: &PeerId) -> Option<&PeerAddress> {
        self.new_table.get(id).or_else(|| self.tried_table.get(id))
    }

    pub fn size(&self) -> usize {
        self.new_table.len() + self.tried_table.len()
    }

    pub fn stats(&self) -> AddressBookStats {
        AddressBookStats {
            new_count: self.new_table.len(),
            tried_count: self.tried_table.len(),
        }
    }

    pub fn all_entries(&self) -> impl Iterator<Item = &PeerAddress> {
        self.new_table.iter().chain(self.tried_table.iter())
    }

    /// Selects up to `k` distinct addresses, drawing `tried_selection_fraction`
    /// of them from the Tried table when it has enough entries, falling back
    /// to New for the remainder.
    pub fn select_peers(&self, k: usize, rng: &mut impl Rng) -> Vec<PeerAddress> {
        let tried_target = ((k as f64) * self.config.tried_selection_fraction).round() as usize;
        let mut selected = Vec::with_capacity(k);
        let mut seen = std::collections::HashSet::new();

        self.sample_into(&self.tried_table, tried_target, rng, &mut seen, &mut selected);
        let remaining = k.saturating_sub(selected.len());
        self.sample_into(&self.new_table, remaining, rng, &mut seen, &mut selected);
        let remaining = k.saturating_sub(selected.len());
        if remaining > 0 {
            self.sample_into(&self.tried_table, remaining, rng, &mut seen, &mut selected);
        }
        selected
    }

    /// Selects addresses to hand out over peer exchange: routable only,
    /// since RFC1918/loopback/link-local addresses are never useful to a
    /// remote peer.
    pub fn select_for_pex(&self, k: usize, rng: &mut impl Rng) -> Vec<PeerAddress> {
        self.select_peers(k * 2, rng)
            .into_iter()
            .filter(|e| e.addr.is_routable())
            .take(k)
            .collect()
    }

    fn sample_into(
        &self,
        table: &AddressTable,
        want: usize,
        rng: &mut impl Rng,
        seen: &mut std::collections::HashSet<PeerId>,
        out: &mut Vec<PeerAddress>,
    ) {
        let total = table.len();
        if want == 0 || total == 0 {
            return;
        }
        let mut collected = 0;
        let max_attempts = want.saturating_mul(4).max(8);
        for _ in 0..max_attempts {
            if collected >= want || seen.len() >= total {
                break;
            }
            let Some(entry) = table.random_entry_with(|n| rng.gen_range(0..n)) else {
                break;
            };
            if seen.insert(entry.id) {
                out.push(entry.clone());
                collected += 1;
            }
        }
    }

    fn new_bucket_index(&self, source_subnet: &[u8], addr_subnet: &[u8]) -> usize {
        let hash = secure_bucket_hash(&(source_subnet, addr_subnet));
        (hash as usize) % self.config.new_bucket_count
    }

    fn tried_bucket_index(&self, addr_subnet: &[u8]) -> usize {
        let hash = secure_bucket_hash(&addr_subnet);
        (hash as usize) % self.config.tried_bucket_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2p_types::IpAddr;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn net(a: u8, b: u8, c: u8, d: u8) -> NetAddr {
        NetAddr::new(IpAddr::v4(a, b, c, d), 9000)
    }

    fn book() -> AddressBook {
        AddressBook::new(AddressBookConfig::for_testing(), PeerId::new([0; 32]))
    }

    #[test]
    fn duplicate_add_is_a_noop_but_still_updates_last_seen() {
        let mut b = book();
        let id = PeerId::new([1; 32]);
        let src = net(8, 8, 8, 8);
        let addr = net(1, 2, 3, 4);
        assert!(b.add(id, addr, PeerSource::Pex, &src, Timestamp::new(0)).unwrap());
        assert!(!b.add(id, addr, PeerSource::Pex, &src, Timestamp::new(1)).unwrap());
        assert_eq!(b.size(), 1);
        assert_eq!(b.get_address(&id).unwrap().last_seen, Timestamp::new(1));
    }

    #[test]
    fn non_routable_address_is_rejected() {
        let mut b = book();
        let src = net(8, 8, 8, 8);
        let err = b
            .add(PeerId::new([1; 32]), net(192, 168, 1, 1), PeerSource::Pex, &src, Timestamp::new(0))
            .unwrap_err();
        assert!(matches!(err, AddressBookError::NotRoutable));
        assert_eq!(b.size(), 0);
    }

    #[test]
    fn self_address_is_rejected() {
        let mut b = AddressBook::new(AddressBookConfig::for_testing(), PeerId::new([9; 32]));
        let src = net(8, 8, 8, 8);
        let err = b
            .add(PeerId::new([9; 32]), net(1, 1, 1, 1), PeerSource::Pex, &src, Timestamp::new(0))
            .unwrap_err();
        assert!(matches!(err, AddressBookError::SelfAddress));
    }

    #[test]
    fn subnet_total_cap_is_enforced() {
        let mut cfg = AddressBookConfig::for_testing();
        cfg.max_per_subnet_total = 2;
        let mut b = AddressBook::new(cfg, PeerId::new([0; 32]));
        let src = net(8, 8, 8, 8);
        for i in 0..2u8 {
            assert!(b
                .add(PeerId::new([i + 1; 32]), net(203, 0, 113, i), PeerSource::Pex, &src, Timestamp::new(0))
                .unwrap());
        }
        assert!(!b
            .add(PeerId::new([3; 32]), net(203, 0, 113, 9), PeerSource::Pex, &src, Timestamp::new(0))
            .unwrap());
    }

    #[test]
    fn promote_moves_address_from_new_to_tried() {
        let mut b = book();
        let id = PeerId::new([5; 32]);
        let src = net(8, 8, 8, 8);
        b.add(id, net(1, 2, 3, 4), PeerSource::Seed, &src, Timestamp::new(0)).unwrap();
        assert_eq!(b.stats().new_count, 1);
        assert!(b.promote(&id, Timestamp::new(10)));
        let stats = b.stats();
        assert_eq!(stats.new_count, 0);
        assert_eq!(stats.tried_count, 1);
        assert_eq!(b.get_address(&id).unwrap().attempts, 0);
    }

    #[test]
    fn pex_selection_never_returns_private_addresses() {
        // Private addresses are now rejected at `add()` time, so the only
        // way a non-routable entry could reach `select_for_pex` is if that
        // filter were removed; this exercises the filter directly against
        // an address book containing only routable entries.
        let mut b = book();
        let src = net(8, 8, 8, 8);
        b.add(PeerId::new([2; 32]), net(203, 0, 113, 5), PeerSource::Pex, &src, Timestamp::new(0))
            .unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let selected = b.select_for_pex(10, &mut rng);
        assert!(selected.iter().all(|e| e.addr.is_routable()));
    }
}
