//! Peer-exchange payload codec and sampling.

use p2p_types::{IpAddr, NetAddr, PeerId, WireError};

/// One entry offered by a `PeerExchange` message: an identity and the
/// endpoint it was last reachable at. Never includes private addresses —
/// callers build this list from [`p2p_addrbook::AddressBookManager::select_for_pex`],
/// which already filters those out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PexEntry {
    pub id: PeerId,
    pub addr: NetAddr,
}

fn encode_addr(out: &mut Vec<u8>, addr: &NetAddr) {
    match addr.ip {
        IpAddr::V4(o) => {
            out.push(4);
            out.extend_from_slice(&o);
        }
        IpAddr::V6(o) => {
            out.push(6);
            out.extend_from_slice(&o);
        }
    }
    out.extend_from_slice(&addr.port.to_le_bytes());
}

fn decode_addr(buf: &[u8], cursor: &mut usize) -> Result<NetAddr, WireError> {
    if buf.len() < *cursor + 1 {
        return Err(WireError::Truncated);
    }
    let tag = buf[*cursor];
    *cursor += 1;
    let ip = match tag {
        4 => {
            if buf.len() < *cursor + 4 {
                return Err(WireError::Truncated);
            }
            let mut o = [0u8; 4];
            o.copy_from_slice(&buf[*cursor..*cursor + 4]);
            *cursor += 4;
            IpAddr::V4(o)
        }
        6 => {
            if buf.len() < *cursor + 16 {
                return Err(WireError::Truncated);
            }
            let mut o = [0u8; 16];
            o.copy_from_slice(&buf[*cursor..*cursor + 16]);
            *cursor += 16;
            IpAddr::V6(o)
        }
        _ => return Err(WireError::Truncated),
    };
    if buf.len() < *cursor + 2 {
        return Err(WireError::Truncated);
    }
    let port = u16::from_le_bytes([buf[*cursor], buf[*cursor + 1]]);
    *cursor += 2;
    Ok(NetAddr::new(ip, port))
}

/// Encodes a `PeerExchange` message body: a u16 count followed by each
/// entry's 32-byte id and variable-length address.
pub fn encode(entries: &[PexEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + entries.len() * 40);
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(entry.id.as_bytes());
        encode_addr(&mut out, &entry.addr);
    }
    out
}

pub fn decode(buf: &[u8]) -> Result<Vec<PexEntry>, WireError> {
    if buf.len() < 2 {
        return Err(WireError::Truncated);
    }
    let count = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    let mut cursor = 2usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.len() < cursor + 32 {
            return Err(WireError::Truncated);
        }
        let mut id_bytes = [0u8; 32];
        id_bytes.copy_from_slice(&buf[cursor..cursor + 32]);
        cursor += 32;
        let addr = decode_addr(buf, &mut cursor)?;
        entries.push(PexEntry { id: PeerId::new(id_bytes), addr });
    }
    Ok(entries)
}
