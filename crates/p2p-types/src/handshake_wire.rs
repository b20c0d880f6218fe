use crate::errors::WireError;
use crate::ids::PeerId;

const CHAIN_ID_MAX: usize = 64;
const REASON_MAX: usize = 256;

fn write_string(out: &mut Vec<u8>, s: &str, max: usize) -> Result<(), WireError> {
    if s.len() > max {
        return Err(WireError::StringTooLong { max });
    }
    out.extend_from_slice(&(s.len() as u16).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_string(buf: &[u8], cursor: &mut usize, max: usize) -> Result<String, WireError> {
    if buf.len() < *cursor + 2 {
        return Err(WireError::Truncated);
    }
    let len = u16::from_le_bytes([buf[*cursor], buf[*cursor + 1]]) as usize;
    *cursor += 2;
    if len > max {
        return Err(WireError::StringTooLong { max });
    }
    if buf.len() < *cursor + len {
        return Err(WireError::Truncated);
    }
    let s = String::from_utf8_lossy(&buf[*cursor..*cursor + len]).into_owned();
    *cursor += len;
    Ok(s)
}

fn read_bytes32(buf: &[u8], cursor: &mut usize) -> Result<[u8; 32], WireError> {
    if buf.len() < *cursor + 32 {
        return Err(WireError::Truncated);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&buf[*cursor..*cursor + 32]);
    *cursor += 32;
    Ok(out)
}

/// Payload of the `Handshake` message: identity, chain binding, and a claim
/// about the sender's current height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    pub node_id: PeerId,
    pub chain_id: String,
    pub genesis_hash: [u8; 32],
    pub version: u32,
    pub best_height: i64,
}

impl HandshakePayload {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(32 + 2 + self.chain_id.len() + 32 + 4 + 8);
        out.extend_from_slice(self.node_id.as_bytes());
        write_string(&mut out, &self.chain_id, CHAIN_ID_MAX)?;
        out.extend_from_slice(&self.genesis_hash);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.best_height.to_le_bytes());
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = 0usize;
        let node_id = PeerId::new(read_bytes32(buf, &mut cursor)?);
        let chain_id = read_string(buf, &mut cursor, CHAIN_ID_MAX)?;
        let genesis_hash = read_bytes32(buf, &mut cursor)?;
        if buf.len() < cursor + 12 {
            return Err(WireError::Truncated);
        }
        let version = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let best_height = i64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
        Ok(Self {
            node_id,
            chain_id,
            genesis_hash,
            version,
            best_height,
        })
    }
}

/// Payload of the `HandshakeAck` message: whether the handshake was
/// accepted and, if not, why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeAckPayload {
    pub accepted: bool,
    pub node_id: PeerId,
    pub reason: String,
}

impl HandshakeAckPayload {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(1 + 32 + 2 + self.reason.len());
        out.push(if self.accepted { 1 } else { 0 });
        out.extend_from_slice(self.node_id.as_bytes());
        write_string(&mut out, &self.reason, REASON_MAX)?;
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.is_empty() {
            return Err(WireError::Truncated);
        }
        let accepted = buf[0] != 0;
        let mut cursor = 1usize;
        let node_id = PeerId::new(read_bytes32(buf, &mut cursor)?);
        let reason = read_string(buf, &mut cursor, REASON_MAX)?;
        Ok(Self {
            accepted,
            node_id,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trips() {
        let hs = HandshakePayload {
            node_id: PeerId::new([7; 32]),
            chain_id: "cosmos-core-1".to_string(),
            genesis_hash: [9; 32],
            version: 3,
            best_height: 123_456,
        };
        let bytes = hs.encode().unwrap();
        assert_eq!(HandshakePayload::decode(&bytes).unwrap(), hs);
    }

    #[test]
    fn handshake_ack_round_trips() {
        let ack = HandshakeAckPayload {
            accepted: false,
            node_id: PeerId::new([1; 32]),
            reason: "chain id mismatch".to_string(),
        };
        let bytes = ack.encode().unwrap();
        assert_eq!(HandshakeAckPayload::decode(&bytes).unwrap(), ack);
    }

    #[test]
    fn chain_id_over_max_rejected() {
        let hs = HandshakePayload {
            node_id: PeerId::new([0; 32]),
            chain_id: "x".repeat(100),
            genesis_hash: [0; 32],
            version: 1,
            best_height: 0,
        };
        assert!(matches!(
            hs.encode(),
            Err(WireError::StringTooLong { max: 64 })
        ));
    }

    #[test]
    fn truncated_buffer_rejected() {
        assert!(matches!(
            HandshakePayload::decode(&[0u8; 10]),
            Err(WireError::Truncated)
        ));
    }
}
