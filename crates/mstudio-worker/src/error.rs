//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Longest error message stored on a job record.
const MAX_JOB_MESSAGE_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Scene generation failed: {0}")]
    SceneGeneration(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("Bundling failed: {0}")]
    Bundle(String),

    #[error("Site deployment failed: {0}")]
    Deploy(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Render did not finish within {0} seconds")]
    RenderTimeout(u64),

    #[error("Artifact retrieval failed: {0}")]
    Retrieval(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job task panicked: {0}")]
    JobPanicked(String),

    #[error("Worker shut down before the job started")]
    ShuttingDown,

    #[error("Storage error: {0}")]
    Storage(#[from] mstudio_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] mstudio_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] mstudio_queue::QueueError),

    #[error(transparent)]
    Model(#[from] mstudio_models::ModelError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn scene_generation(msg: impl Into<String>) -> Self {
        Self::SceneGeneration(msg.into())
    }

    pub fn transcription(msg: impl Into<String>) -> Self {
        Self::Transcription(msg.into())
    }

    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::Provisioning(msg.into())
    }

    pub fn bundle(msg: impl Into<String>) -> Self {
        Self::Bundle(msg.into())
    }

    pub fn deploy(msg: impl Into<String>) -> Self {
        Self::Deploy(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Submission was refused because the task queue is full.
    pub fn is_busy(&self) -> bool {
        matches!(self, WorkerError::Queue(e) if e.is_busy())
    }

    /// Whether the caller sent a bad request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WorkerError::Validation(_)
                | WorkerError::Model(mstudio_models::ModelError::Validation(_))
        )
    }

    /// Message recorded on a failed job, capped in length.
    pub fn job_message(&self) -> String {
        let message = self.to_string();
        if message.chars().count() <= MAX_JOB_MESSAGE_CHARS {
            return message;
        }
        let mut truncated: String = message.chars().take(MAX_JOB_MESSAGE_CHARS).collect();
        truncated.push_str("...");
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstudio_queue::QueueError;

    #[test]
    fn test_busy_detection() {
        let err: WorkerError = QueueError::Full { capacity: 8 }.into();
        assert!(err.is_busy());
        assert!(!WorkerError::render("x").is_busy());
    }

    #[test]
    fn test_job_message_truncated() {
        let err = WorkerError::render("e".repeat(2_000));
        let message = err.job_message();
        assert!(message.starts_with("Render failed: "));
        assert_eq!(message.chars().count(), MAX_JOB_MESSAGE_CHARS + 3);
    }

    #[test]
    fn test_client_errors() {
        let err: WorkerError = mstudio_models::ModelError::validation("bad").into();
        assert!(err.is_client_error());
        assert!(!WorkerError::render("x").is_client_error());
    }
}
