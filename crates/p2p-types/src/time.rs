use serde::{Deserialize, Serialize};

/// Unix-epoch seconds. Arithmetic saturates rather than panicking or
/// wrapping, since timestamps routinely flow through subtraction against
/// peer-supplied values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn add_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    pub fn sub_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }

    /// Seconds elapsed from `self` to `later`; zero if `later` precedes `self`.
    pub fn elapsed_since(&self, later: Timestamp) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

impl std::fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}
