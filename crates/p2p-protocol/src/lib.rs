//! # P2P Protocol Engine
//!
//! Framed wire codec, mutual handshake, per-peer rate limiting, gossip
//! fanout with duplicate suppression, peer exchange and ping/pong
//! liveness. Owns one read task and one write task per live connection;
//! everything else in this crate is either pure (framing, codecs,
//! selection logic) or a thin coordinator over those connections.

pub mod config;
pub mod connection;
pub mod dedup;
pub mod dialer;
pub mod engine;
pub mod errors;
pub mod gossip;
pub mod handshake;
pub mod heartbeat;
pub mod pex;
pub mod rate_limit;
pub mod router;

pub use config::ProtocolConfig;
pub use dialer::TcpDialer;
pub use engine::{PeerSnapshot, ProtocolEngine};
pub use errors::ProtocolError;
pub use handshake::{verify_handshake, NodeIdentity, RejectReason, SignedHandshake};
pub use router::{Handler, HandlerRegistry};
