//! The outbound `Dialer` adapter consumed by `p2p_peer_manager::PeerManager`.
//! Opens the TCP socket and runs the handshake before the manager reserves
//! an outbound slot for the connection.

use std::net::{IpAddr as StdIpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use p2p_peer_manager::{Dialer, PeerManagerError};
use p2p_types::{Direction, IpAddr, NetAddr, PeerId};
use tokio::net::TcpStream;

use crate::engine::ProtocolEngine;

pub(crate) fn to_std_socket_addr(addr: NetAddr) -> SocketAddr {
    match addr.ip {
        IpAddr::V4(o) => SocketAddr::new(StdIpAddr::V4(Ipv4Addr::new(o[0], o[1], o[2], o[3])), addr.port),
        IpAddr::V6(o) => SocketAddr::new(StdIpAddr::V6(Ipv6Addr::from(o)), addr.port),
    }
}

pub(crate) fn to_net_addr(addr: SocketAddr) -> NetAddr {
    let ip = match addr.ip() {
        StdIpAddr::V4(v4) => IpAddr::V4(v4.octets()),
        StdIpAddr::V6(v6) => IpAddr::V6(v6.octets()),
    };
    NetAddr::new(ip, addr.port())
}

/// Opens the TCP connection and runs the mutual handshake; the engine is
/// the one party that can register the resulting connection into its read
/// and write tasks, so the dialer is just thin glue over it.
pub struct TcpDialer {
    engine: Arc<ProtocolEngine>,
}

impl TcpDialer {
    pub fn new(engine: Arc<ProtocolEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, id: PeerId, addr: NetAddr) -> Result<(), PeerManagerError> {
        let socket_addr = to_std_socket_addr(addr);
        let stream = tokio::time::timeout(self.engine.config().dial_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| PeerManagerError::Io("dial timed out".to_string()))?
            .map_err(|e| PeerManagerError::Io(e.to_string()))?;

        self.engine
            .handshake_and_register(stream, addr, Direction::Outbound, Some(id))
            .await
            .map(|_| ())
            .map_err(|e| PeerManagerError::Denied(e.to_string()))
    }
}
