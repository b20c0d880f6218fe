//! # P2P Sync Engine
//!
//! Pulls contiguous block ranges from reliable peers until the local
//! chain catches up to the best observed height, delivering them to the
//! application strictly in ascending order, and scaffolds snapshot
//! transfer for nodes too far behind to catch up block-by-block.

pub mod config;
pub mod errors;
pub mod manager;
pub mod reliability;
pub mod state;
pub mod wire;

pub use config::SyncConfig;
pub use errors::SyncError;
pub use manager::{BlockSink, SyncEngine};
pub use state::SyncMode;
pub use wire::{
    BlockData, BlockRequestPayload, BlockResponsePayload, SnapshotChunkPayload, SnapshotRequestPayload, StatusPayload,
};
