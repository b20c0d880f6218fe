use thiserror::Error;

/// Failures surfaced by the sync scheduler. None of these are fatal to the
/// process: each maps to a health event or a re-plan, never a panic.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no peer meets the reliability floor")]
    NoReliablePeers,

    #[error("gap at height {at} could not be closed before the reorder window expired")]
    GapUnclosable { at: u64 },

    #[error("snapshot manifest invalid or not agreed by enough peers")]
    ManifestInvalid,

    #[error("application sink rejected a delivery: {0}")]
    Io(String),
}
