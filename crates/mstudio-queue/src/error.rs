//! Queue and store error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The task queue has no free slot; callers surface this as "busy".
    #[error("Task queue is full ({capacity} pending)")]
    Full { capacity: usize },

    #[error("Task queue is closed")]
    Closed,

    #[error("Job already exists: {0}")]
    Duplicate(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Whether the error means "try again later" rather than a fault.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Full { .. })
    }
}
