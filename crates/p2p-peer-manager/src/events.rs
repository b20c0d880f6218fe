use p2p_types::{Direction, NetAddr, PeerId};

#[derive(Debug, Clone)]
pub enum PeerManagerEvent {
    Connected { id: PeerId, addr: NetAddr, direction: Direction },
    Disconnected { id: PeerId, addr: NetAddr },
    DialFailed { id: PeerId, addr: NetAddr },
    Evicted { id: PeerId },
}
