use std::time::Duration;

/// Configuration for the address book's New/Tried bucket tables.
#[derive(Debug, Clone)]
pub struct AddressBookConfig {
    /// Number of buckets in the New table.
    pub new_bucket_count: usize,
    /// Number of buckets in the Tried table.
    pub tried_bucket_count: usize,
    /// Maximum entries per bucket.
    pub bucket_size: usize,
    /// Maximum entries from the same subnet per bucket.
    pub max_per_subnet_per_bucket: usize,
    /// Maximum entries from the same subnet across the whole table.
    pub max_per_subnet_total: usize,
    /// Fraction of `SelectPeers` results drawn from the Tried table when
    /// both tables have enough entries to satisfy it.
    pub tried_selection_fraction: f64,
    /// How often the book is written to disk unconditionally.
    pub autosave_interval: Duration,
}

impl Default for AddressBookConfig {
    fn default() -> Self {
        Self {
            new_bucket_count: 1024,
            tried_bucket_count: 256,
            bucket_size: 64,
            max_per_subnet_per_bucket: 2,
            max_per_subnet_total: 64,
            tried_selection_fraction: 0.85,
            autosave_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl AddressBookConfig {
    /// Smaller tables and a fast autosave cadence for tests.
    pub fn for_testing() -> Self {
        Self {
            new_bucket_count: 16,
            tried_bucket_count: 8,
            bucket_size: 4,
            max_per_subnet_per_bucket: 2,
            max_per_subnet_total: 8,
            tried_selection_fraction: 0.85,
            autosave_interval: Duration::from_millis(50),
        }
    }
}
