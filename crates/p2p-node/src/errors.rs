use thiserror::Error;

use p2p_addrbook::AddressBookError;
use p2p_peer_manager::PeerManagerError;
use p2p_protocol::ProtocolError;
use p2p_reputation::ReputationError;
use p2p_sync::SyncError;

use crate::config::ConfigError;

/// Top-level error surfaced by the node facade. Each variant wraps the
/// originating component's own error rather than re-deriving a parallel
/// taxonomy.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("address book error: {0}")]
    AddressBook(#[from] AddressBookError),
    #[error("reputation error: {0}")]
    Reputation(#[from] ReputationError),
    #[error("peer manager error: {0}")]
    PeerManager(#[from] PeerManagerError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("invalid listen address {0:?}: {1}")]
    InvalidListenAddr(String, String),
}
