use std::collections::HashMap;

use p2p_types::{PeerAddress, PeerId, Timestamp};

use crate::config::AddressBookConfig;

/// A bucket of addresses with a per-subnet cap, mirroring Bitcoin's
/// `addrman` bucket shape.
#[derive(Debug, Clone, Default)]
pub struct AddressBucket {
    entries: Vec<PeerAddress>,
    subnet_counts: HashMap<Vec<u8>, usize>,
}

impl AddressBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_accept(&self, subnet: &[u8], config: &AddressBookConfig) -> bool {
        if self.entries.len() >= config.bucket_size {
            return false;
        }
        let count = self.subnet_counts.get(subnet).copied().unwrap_or(0);
        count < config.max_per_subnet_per_bucket
    }

    pub fn add(&mut self, entry: PeerAddress) {
        let subnet = entry.addr.ip.subnet_key();
        *self.subnet_counts.entry(subnet).or_insert(0) += 1;
        self.entries.push(entry);
    }

    pub fn remove(&mut self, id: &PeerId) -> Option<PeerAddress> {
        let pos = self.entries.iter().position(|e| &e.id == id)?;
        let entry = self.entries.remove(pos);
        self.drop_subnet_count(&entry.addr.ip.subnet_key());
        Some(entry)
    }

    pub fn entries(&self) -> &[PeerAddress] {
        &self.entries
    }

    pub fn get_entry(&self, index: usize) -> Option<&PeerAddress> {
        self.entries.get(index)
    }

    /// Updates `last_seen` on an existing entry, e.g. on a re-add of an
    /// already-known address. Returns `false` if `id` isn't in this bucket.
    pub fn touch(&mut self, id: &PeerId, now: Timestamp) -> bool {
        match self.entries.iter_mut().find(|e| &e.id == id) {
            Some(entry) => {
                entry.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Evicts the entry with the oldest `last_dialed` (never-dialed entries
    /// are treated as oldest of all), freeing room for a promotion.
    pub fn evict_oldest(&mut self) -> Option<PeerAddress> {
        if self.entries.is_empty() {
            return None;
        }
        let oldest_idx = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_dialed.map(|t| t.as_secs()).unwrap_or(0))
            .map(|(idx, _)| idx)?;
        let entry = self.entries.remove(oldest_idx);
        self.drop_subnet_count(&entry.addr.ip.subnet_key());
        Some(entry)
    }

    fn drop_subnet_count(&mut self, subnet: &[u8]) {
        if let Some(count) = self.subnet_counts.get_mut(subnet) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.subnet_counts.remove(subnet);
            }
        }
    }
}
