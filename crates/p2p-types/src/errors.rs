use thiserror::Error;

/// Decode-time failures for a [`crate::envelope::MessageEnvelope`]. All are
/// `ProtocolViolation`-class at the call site: the caller disconnects the
/// peer and records the event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("bad magic bytes")]
    BadMagic,
    #[error("crc32 mismatch")]
    BadCrc,
    #[error("frame length {len} exceeds cap {max}")]
    TooLarge { len: u32, max: u32 },
    #[error("unknown message type {0}")]
    UnknownType(u16),
    #[error("payload truncated")]
    Truncated,
    #[error("string field exceeds max length {max}")]
    StringTooLong { max: usize },
}
