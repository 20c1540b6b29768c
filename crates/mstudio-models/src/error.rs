//! Model error types.

use thiserror::Error;

use crate::job::JobStatus;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    #[error("Job already terminal ({0}), transition rejected")]
    AlreadyTerminal(JobStatus),
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_scene(msg: impl Into<String>) -> Self {
        Self::InvalidScene(msg.into())
    }
}
