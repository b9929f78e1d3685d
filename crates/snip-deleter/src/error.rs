use thiserror::Error;
use tokio::task::JoinError;

pub type Result<T> = std::result::Result<T, DeleterError>;

#[derive(Debug, Error)]
pub enum DeleterError {
    #[error("delete queue is full")]
    QueueFull,
    #[error("delete queue is closed")]
    Closed,
    #[error("delete worker failed: {0}")]
    Worker(#[from] JoinError),
}
