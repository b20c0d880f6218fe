use crc32fast::Hasher;

use crate::errors::WireError;
use crate::message::MessageType;

/// 4-byte magic prefix identifying frames belonging to this protocol.
pub const MAGIC: [u8; 4] = *b"P2PC";
pub const PROTOCOL_VERSION: u16 = 1;
/// Hard cap on a single frame's payload, matching spec's "e.g. 8 MiB" bound.
pub const MAX_ENVELOPE_SIZE: u32 = 8 * 1024 * 1024;
const HEADER_LEN: usize = 4 + 2 + 2 + 4 + 4;

/// Fixed framing used for every message on the wire: magic, version, type,
/// length, CRC32, then the payload itself. The CRC covers every header
/// field except itself, plus the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub version: u16,
    pub msg_type: u16,
    pub payload: Vec<u8>,
}

impl MessageEnvelope {
    pub fn new(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_type: msg_type.as_u16(),
            payload,
        }
    }

    fn crc(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(&MAGIC);
        hasher.update(&self.version.to_le_bytes());
        hasher.update(&self.msg_type.to_le_bytes());
        hasher.update(&(self.payload.len() as u32).to_le_bytes());
        hasher.update(&self.payload);
        hasher.finalize()
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let len = self.payload.len() as u32;
        if len > MAX_ENVELOPE_SIZE {
            return Err(WireError::TooLarge {
                len,
                max: MAX_ENVELOPE_SIZE,
            });
        }
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.msg_type.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.crc().to_le_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Attempts to parse exactly one frame from the front of `buf`. Returns
    /// `Ok(None)` when `buf` does not yet contain a complete frame (the
    /// caller should read more bytes and retry) and `Ok(Some((envelope,
    /// consumed)))` otherwise, where `consumed` is the number of bytes of
    /// `buf` the frame occupied.
    pub fn try_decode(buf: &[u8]) -> Result<Option<(Self, usize)>, WireError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        if buf[0..4] != MAGIC {
            return Err(WireError::BadMagic);
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        let msg_type = u16::from_le_bytes([buf[6], buf[7]]);
        let length = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let crc = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);

        if length > MAX_ENVELOPE_SIZE {
            return Err(WireError::TooLarge {
                len: length,
                max: MAX_ENVELOPE_SIZE,
            });
        }
        let total = HEADER_LEN + length as usize;
        if buf.len() < total {
            return Ok(None);
        }
        if MessageType::from_u16(msg_type).is_none() {
            return Err(WireError::UnknownType(msg_type));
        }

        let payload = buf[HEADER_LEN..total].to_vec();
        let envelope = MessageEnvelope {
            version,
            msg_type,
            payload,
        };
        if envelope.crc() != crc {
            return Err(WireError::BadCrc);
        }
        Ok(Some((envelope, total)))
    }
}
