use async_trait::async_trait;
use p2p_types::{NetAddr, PeerId};

use crate::errors::PeerManagerError;

/// Performs the actual transport-level connection and handshake for an
/// outbound dial. The peer manager owns slot accounting and policy; the
/// node wiring supplies the adapter that speaks the wire protocol.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, id: PeerId, addr: NetAddr) -> Result<(), PeerManagerError>;
}
