use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerManagerError {
    #[error("no connection slots available")]
    NoSlotsAvailable,
    #[error("already dialing or connected to this peer")]
    DuplicateDial,
    #[error("connection denied: {0}")]
    Denied(String),
    #[error("transport error: {0}")]
    Io(String),
}
