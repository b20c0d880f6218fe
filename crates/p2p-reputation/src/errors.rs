use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReputationError {
    #[error("storage io error: {0}")]
    StorageIo(String),
    #[error("invalid score input: {0}")]
    InvalidScoreInput(String),
    #[error("peer already whitelisted")]
    AlreadyWhitelisted,
}
