//! Gossip deduplication: a time-indexed fingerprint set, sharded by
//! fingerprint hash to reduce lock contention across peer read tasks.

use std::collections::HashMap;
use std::hash::Hasher;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use siphasher::sip::SipHasher13;

pub type Fingerprint = u64;

/// SipHash-1-3 digest of a gossip payload, used as its dedup fingerprint.
/// Mirrors the short-id construction used for compact-block transaction
/// ids: a keyed hash over the raw bytes, no second hash primitive needed.
pub fn fingerprint(payload: &[u8]) -> Fingerprint {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write(payload);
    hasher.finish()
}

struct ShardEntry {
    seen_at: Instant,
    /// Peers this item has already been forwarded to or received from, so
    /// gossip fanout never resends an item to a peer that already has it.
    told: Vec<p2p_types::PeerId>,
}

struct Shard {
    entries: HashMap<Fingerprint, ShardEntry>,
}

/// Sharded, TTL-expiring set of recently seen gossip fingerprints.
pub struct GossipDedup {
    shards: Vec<Mutex<Shard>>,
    ttl: Duration,
}

impl GossipDedup {
    pub fn new(shard_count: usize, ttl: Duration) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(Shard { entries: HashMap::new() }))
                .collect(),
            ttl,
        }
    }

    fn shard_for(&self, fp: Fingerprint) -> &Mutex<Shard> {
        &self.shards[(fp as usize) % self.shards.len()]
    }

    /// Records first receipt of `fp` from `source` if not already seen
    /// within the TTL window. Returns `true` on first receipt (the caller
    /// should run the handler and emit `ValidMessage`), `false` for a
    /// duplicate (the caller drops the message before the handler runs).
    pub fn observe(&self, fp: Fingerprint, source: p2p_types::PeerId) -> bool {
        let mut shard = self.shard_for(fp).lock();
        let now = Instant::now();
        if let Some(entry) = shard.entries.get_mut(&fp) {
            if now.duration_since(entry.seen_at) < self.ttl {
                if !entry.told.contains(&source) {
                    entry.told.push(source);
                }
                return false;
            }
        }
        shard.entries.insert(fp, ShardEntry { seen_at: now, told: vec![source] });
        true
    }

    /// Marks `fp` as already delivered to `peer`, for use when gossip
    /// fanout selects outbound targets (never resend to a peer who already
    /// has the item, whether as the original source or a prior relay).
    pub fn mark_told(&self, fp: Fingerprint, peer: p2p_types::PeerId) {
        let mut shard = self.shard_for(fp).lock();
        let now = Instant::now();
        let entry = shard.entries.entry(fp).or_insert_with(|| ShardEntry { seen_at: now, told: Vec::new() });
        if !entry.told.contains(&peer) {
            entry.told.push(peer);
        }
    }

    pub fn already_told(&self, fp: Fingerprint, peer: &p2p_types::PeerId) -> bool {
        self.shard_for(fp).lock().entries.get(&fp).map(|e| e.told.contains(peer)).unwrap_or(false)
    }

    /// Drops entries older than the TTL. Run periodically off the dedup GC
    /// task rather than on every lookup, so a burst of lookups doesn't pay
    /// a full sweep each time.
    pub fn sweep(&self) {
        let now = Instant::now();
        for shard in &self.shards {
            shard.lock().entries.retain(|_, e| now.duration_since(e.seen_at) < self.ttl);
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
