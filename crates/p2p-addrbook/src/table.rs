use std::collections::HashMap;

use p2p_types::{PeerAddress, PeerId, Timestamp};

use crate::bucket::AddressBucket;

/// Either the New or the Tried table: a fixed number of buckets plus the
/// bookkeeping needed for O(1) membership and subnet-total checks.
#[derive(Debug)]
pub struct AddressTable {
    pub(crate) buckets: Vec<AddressBucket>,
    pub(crate) subnet_totals: HashMap<Vec<u8>, usize>,
    pub(crate) id_to_bucket: HashMap<PeerId, usize>,
}

impl AddressTable {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            buckets: (0..bucket_count).map(|_| AddressBucket::new()).collect(),
            subnet_totals: HashMap::new(),
            id_to_bucket: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        !self.buckets.iter().any(|b| !b.is_empty())
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.id_to_bucket.contains_key(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerAddress> {
        let idx = *self.id_to_bucket.get(id)?;
        self.buckets[idx].entries().iter().find(|e| &e.id == id)
    }

    pub fn touch(&mut self, id: &PeerId, now: Timestamp) -> bool {
        let Some(&idx) = self.id_to_bucket.get(id) else {
            return false;
        };
        self.buckets[idx].touch(id, now)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerAddress> {
        self.buckets.iter().flat_map(|b| b.entries().iter())
    }

    /// Picks one entry uniformly at random across the whole table using an
    /// externally supplied `0..total -> index` function, so the table never
    /// hard-depends on a concrete RNG.
    pub fn random_entry_with<F>(&self, mut random_fn: F) -> Option<&PeerAddress>
    where
        F: FnMut(usize) -> usize,
    {
        let total = self.len();
        if total == 0 {
            return None;
        }
        let mut remaining = random_fn(total);
        for bucket in &self.buckets {
            let len = bucket.len();
            if remaining < len {
                return bucket.get_entry(remaining);
            }
            remaining -= len;
        }
        None
    }
}
