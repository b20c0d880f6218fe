//! Wire codecs for the sync-facing message types (`Status`, `BlockRequest`,
//! `BlockResponse`, `SnapshotRequest`, `SnapshotChunk`). The block/chunk
//! payload bytes themselves are opaque here — serializing an actual block
//! is the hosting application's concern, not this crate's.

use p2p_types::WireError;

fn read_u64(buf: &[u8], cursor: &mut usize) -> Result<u64, WireError> {
    if buf.len() < *cursor + 8 {
        return Err(WireError::Truncated);
    }
    let v = u64::from_le_bytes(buf[*cursor..*cursor + 8].try_into().unwrap());
    *cursor += 8;
    Ok(v)
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> Result<u32, WireError> {
    if buf.len() < *cursor + 4 {
        return Err(WireError::Truncated);
    }
    let v = u32::from_le_bytes(buf[*cursor..*cursor + 4].try_into().unwrap());
    *cursor += 4;
    Ok(v)
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

fn read_blob(buf: &[u8], cursor: &mut usize) -> Result<Vec<u8>, WireError> {
    let len = read_u32(buf, cursor)? as usize;
    if buf.len() < *cursor + len {
        return Err(WireError::Truncated);
    }
    let blob = buf[*cursor..*cursor + len].to_vec();
    *cursor += len;
    Ok(blob)
}

fn write_blob(out: &mut Vec<u8>, blob: &[u8]) {
    out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
    out.extend_from_slice(blob);
}

/// Advertises the sender's current best height. Broadcast on gossip after
/// every accepted block and exchanged at connect time so peers learn each
/// other's target height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPayload {
    pub best_height: u64,
}

impl StatusPayload {
    pub fn encode(&self) -> Vec<u8> {
        self.best_height.to_le_bytes().to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = 0usize;
        let best_height = read_u64(buf, &mut cursor)?;
        Ok(Self { best_height })
    }
}

/// Requests a contiguous, inclusive range of block heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequestPayload {
    pub start_height: u64,
    pub end_height: u64,
}

impl BlockRequestPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&self.start_height.to_le_bytes());
        out.extend_from_slice(&self.end_height.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = 0usize;
        let start_height = read_u64(buf, &mut cursor)?;
        let end_height = read_u64(buf, &mut cursor)?;
        Ok(Self { start_height, end_height })
    }
}

/// One block in a `BlockResponse`. `payload` is opaque application bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    pub height: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockResponsePayload {
    pub blocks: Vec<BlockData>,
}

impl BlockResponsePayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.blocks.len() as u32).to_le_bytes());
        for block in &self.blocks {
            out.extend_from_slice(&block.height.to_le_bytes());
            write_blob(&mut out, &block.payload);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = 0usize;
        let count = read_u32(buf, &mut cursor)? as usize;
        let mut blocks = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let height = read_u64(buf, &mut cursor)?;
            let payload = read_blob(buf, &mut cursor)?;
            blocks.push(BlockData { height, payload });
        }
        Ok(Self { blocks })
    }
}

/// Requests the manifest and first chunk of a snapshot at or below
/// `near_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRequestPayload {
    pub near_height: u64,
}

impl SnapshotRequestPayload {
    pub fn encode(&self) -> Vec<u8> {
        self.near_height.to_le_bytes().to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = 0usize;
        let near_height = read_u64(buf, &mut cursor)?;
        Ok(Self { near_height })
    }
}

/// One chunk of a snapshot. Carries the manifest hash and total chunk
/// count on every message rather than in a separate manifest message, so
/// the first chunk received is enough to bootstrap knowledge of the whole
/// snapshot (this sync engine only scaffolds snapshot transfer: chunk
/// application semantics belong to the hosting application).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotChunkPayload {
    pub manifest_hash: [u8; 32],
    pub total_chunks: u32,
    pub chunk_index: u32,
    pub chunk_hash: [u8; 32],
    pub height: u64,
    pub data: Vec<u8>,
}

impl SnapshotChunkPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 4 + 4 + 32 + 8 + self.data.len());
        out.extend_from_slice(&self.manifest_hash);
        out.extend_from_slice(&self.total_chunks.to_le_bytes());
        out.extend_from_slice(&self.chunk_index.to_le_bytes());
        out.extend_from_slice(&self.chunk_hash);
        out.extend_from_slice(&self.height.to_le_bytes());
        write_blob(&mut out, &self.data);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = 0usize;
        let manifest_hash = read_bytes32(buf, &mut cursor)?;
        let total_chunks = read_u32(buf, &mut cursor)?;
        let chunk_index = read_u32(buf, &mut cursor)?;
        let chunk_hash = read_bytes32(buf, &mut cursor)?;
        let height = read_u64(buf, &mut cursor)?;
        let data = read_blob(buf, &mut cursor)?;
        Ok(Self { manifest_hash, total_chunks, chunk_index, chunk_hash, height, data })
    }

    /// The chunk hash actually carried by `data`, for verification against
    /// `chunk_hash` before the chunk is applied.
    pub fn computed_chunk_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(&self.data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}
