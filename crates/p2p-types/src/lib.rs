//! # P2P Types
//!
//! Shared identifiers, addresses, wire framing and message-type registry
//! for the peer-to-peer networking core. This crate has no runtime
//! dependencies beyond serde/thiserror/crc32fast so every other crate in
//! the workspace can depend on it without pulling in tokio.

pub mod addr;
pub mod envelope;
pub mod errors;
pub mod handshake_wire;
pub mod health;
pub mod ids;
pub mod message;
pub mod peer;
pub mod score;
pub mod time;

pub use addr::{IpAddr, NetAddr};
pub use envelope::{MessageEnvelope, MAGIC, MAX_ENVELOPE_SIZE, PROTOCOL_VERSION};
pub use errors::WireError;
pub use handshake_wire::{HandshakeAckPayload, HandshakePayload};
pub use health::HealthEvent;
pub use ids::PeerId;
pub use message::{GossipClass, MessageType};
pub use peer::{Bucket, Direction, PeerAddress, PeerSource};
pub use score::Score;
pub use time::Timestamp;
