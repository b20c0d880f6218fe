//! Per-connection framing buffer and outbound write loop.

use std::time::Duration;

use p2p_types::{Direction, MessageEnvelope, NetAddr, PeerId, WireError};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

/// Accumulates bytes read off the socket and yields complete frames.
/// Decoupled from the socket itself so framing logic is unit-testable
/// without spinning up a listener.
#[derive(Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drains every complete frame currently buffered. A decode error
    /// (bad magic, CRC, oversized length, unknown type) is fatal for the
    /// connection: framing is defined to be unrecoverable once corrupted,
    /// so the caller disconnects rather than trying to resynchronize.
    pub fn drain(&mut self) -> Result<Vec<MessageEnvelope>, WireError> {
        let mut out = Vec::new();
        loop {
            match MessageEnvelope::try_decode(&self.buf)? {
                Some((envelope, consumed)) => {
                    self.buf.drain(..consumed);
                    out.push(envelope);
                }
                None => break,
            }
        }
        Ok(out)
    }
}

/// Outward-facing handle to a live connection: enough to queue a message
/// and to answer metadata questions without touching the socket.
#[derive(Clone)]
pub struct PeerHandle {
    pub id: PeerId,
    pub addr: NetAddr,
    pub direction: Direction,
    outbound_tx: mpsc::Sender<MessageEnvelope>,
}

impl PeerHandle {
    pub fn new(id: PeerId, addr: NetAddr, direction: Direction, outbound_tx: mpsc::Sender<MessageEnvelope>) -> Self {
        Self { id, addr, direction, outbound_tx }
    }

    pub fn send(&self, envelope: MessageEnvelope) -> bool {
        self.outbound_tx.try_send(envelope).is_ok()
    }
}

/// Drains outbound envelopes onto the socket until the channel closes or a
/// write fails. Each write observes `write_timeout`; a slow or wedged peer
/// times out and the connection is torn down by the caller noticing the
/// task exit.
pub async fn run_writer(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<MessageEnvelope>, write_timeout: Duration) {
    while let Some(envelope) = rx.recv().await {
        let bytes = match envelope.encode() {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "dropping outbound message that failed to encode");
                continue;
            }
        };
        let result = tokio::time::timeout(write_timeout, writer.write_all(&bytes)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "write failed, closing connection");
                break;
            }
            Err(_) => {
                tracing::debug!("write timed out, closing connection");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2p_types::MessageType;

    #[test]
    fn drains_multiple_frames_fed_in_one_chunk() {
        let a = MessageEnvelope::new(MessageType::Ping, vec![1, 2, 3]).encode().unwrap();
        let b = MessageEnvelope::new(MessageType::Pong, vec![4, 5]).encode().unwrap();
        let mut reader = FrameReader::new();
        let mut combined = a.clone();
        combined.extend_from_slice(&b);
        reader.feed(&combined);
        let frames = reader.drain().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].msg_type, MessageType::Ping.as_u16());
        assert_eq!(frames[1].msg_type, MessageType::Pong.as_u16());
    }

    #[test]
    fn partial_frame_is_buffered_until_complete() {
        let full = MessageEnvelope::new(MessageType::Status, vec![9; 10]).encode().unwrap();
        let mut reader = FrameReader::new();
        reader.feed(&full[..full.len() - 3]);
        assert!(reader.drain().unwrap().is_empty());
        reader.feed(&full[full.len() - 3..]);
        assert_eq!(reader.drain().unwrap().len(), 1);
    }

    #[test]
    fn corrupted_frame_surfaces_as_an_error() {
        let mut bytes = MessageEnvelope::new(MessageType::Ping, vec![1]).encode().unwrap();
        *bytes.last_mut().unwrap() ^= 0xFF;
        let mut reader = FrameReader::new();
        reader.feed(&bytes);
        assert!(reader.drain().is_err());
    }
}
