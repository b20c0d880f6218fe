/// Wire-level message type tags. Values are part of the wire protocol and
/// must never be renumbered once shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    Handshake = 1,
    HandshakeAck = 2,
    Ping = 3,
    Pong = 4,
    Status = 5,
    Block = 10,
    Tx = 11,
    PeerExchange = 20,
    BlockRequest = 30,
    BlockResponse = 31,
    SnapshotRequest = 40,
    SnapshotChunk = 41,
}

impl MessageType {
    pub fn from_u16(raw: u16) -> Option<Self> {
        use MessageType::*;
        Some(match raw {
            1 => Handshake,
            2 => HandshakeAck,
            3 => Ping,
            4 => Pong,
            5 => Status,
            10 => Block,
            11 => Tx,
            20 => PeerExchange,
            30 => BlockRequest,
            31 => BlockResponse,
            40 => SnapshotRequest,
            41 => SnapshotChunk,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Gossip fanout class; non-gossip message types have no class.
    pub fn gossip_class(self) -> Option<GossipClass> {
        match self {
            MessageType::Block => Some(GossipClass::Block),
            MessageType::Tx => Some(GossipClass::Tx),
            MessageType::PeerExchange => Some(GossipClass::PeerExchange),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GossipClass {
    Block,
    Tx,
    PeerExchange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_types() {
        for raw in [1u16, 2, 3, 4, 5, 10, 11, 20, 30, 31, 40, 41] {
            let ty = MessageType::from_u16(raw).expect("known type");
            assert_eq!(ty.as_u16(), raw);
        }
    }

    #[test]
    fn unknown_type_is_none() {
        assert!(MessageType::from_u16(9999).is_none());
    }
}
