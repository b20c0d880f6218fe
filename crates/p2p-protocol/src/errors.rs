use thiserror::Error;

/// Errors a connection or the engine surfaces; all but [`ProtocolError::Io`]
/// and [`ProtocolError::Timeout`] are `ProtocolViolation`-class and carry a
/// reputation consequence at the call site.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("peer not connected")]
    NotConnected,
    #[error("operation timed out")]
    Timeout,
    #[error("io error: {0}")]
    Io(String),
}
