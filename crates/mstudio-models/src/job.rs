//! Render job records and their state machine.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::word::TimestampedWord;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What the job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Prompt → generated scene → rendered video
    Render,
    /// Source video → transcription → captioned video
    Captions,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Render => "render",
            JobKind::Captions => "captions",
        }
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is being worked on
    #[default]
    Processing,
    /// Job completed successfully
    Done,
    /// Job failed with an error
    Error,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Human-readable progress label of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    #[default]
    Queued,
    GeneratingScene,
    DownloadingSource,
    ExtractingAudio,
    Transcribing,
    Provisioning,
    DeployingSite,
    Rendering,
    DownloadingArtifact,
    BurningSubtitles,
    Complete,
    Failed,
}

impl JobStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStep::Queued => "queued",
            JobStep::GeneratingScene => "generating_scene",
            JobStep::DownloadingSource => "downloading_source",
            JobStep::ExtractingAudio => "extracting_audio",
            JobStep::Transcribing => "transcribing",
            JobStep::Provisioning => "provisioning",
            JobStep::DeployingSite => "deploying_site",
            JobStep::Rendering => "rendering",
            JobStep::DownloadingArtifact => "downloading_artifact",
            JobStep::BurningSubtitles => "burning_subtitles",
            JobStep::Complete => "complete",
            JobStep::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Successful outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    /// Public URL of the rendered video; absent when there was nothing to render
    pub url: Option<String>,
    pub title: String,
    pub duration_seconds: f64,
    pub fps: u32,
    /// Transcribed words (caption jobs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<TimestampedWord>>,
}

impl JobResult {
    /// Duration in seconds rounded to two decimals.
    pub fn duration_from_frames(duration_in_frames: u32, fps: u32) -> f64 {
        if fps == 0 {
            return 0.0;
        }
        let secs = duration_in_frames as f64 / fps as f64;
        (secs * 100.0).round() / 100.0
    }
}

/// A render job record.
///
/// Created in `processing`, transitions exactly once to `done` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderJob {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub step: JobStep,
    /// Remote render progress (0-100)
    #[serde(default)]
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    /// Create a new job record in `processing` state.
    pub fn new(id: JobId, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            status: JobStatus::Processing,
            step: JobStep::Queued,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Update the progress label. Ignored once terminal.
    pub fn set_step(&mut self, step: JobStep) {
        if self.is_terminal() {
            return;
        }
        self.step = step;
        self.updated_at = Utc::now();
    }

    /// Update remote render progress. Ignored once terminal.
    pub fn set_progress(&mut self, progress: u8) {
        if self.is_terminal() {
            return;
        }
        self.progress = progress.min(100);
        self.updated_at = Utc::now();
    }

    /// Transition to `done`.
    pub fn complete(&mut self, result: JobResult) -> ModelResult<()> {
        self.ensure_not_terminal()?;
        self.status = JobStatus::Done;
        self.step = JobStep::Complete;
        self.progress = 100;
        self.result = Some(result);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition to `error`.
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.ensure_not_terminal()?;
        self.status = JobStatus::Error;
        self.step = JobStep::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the record is older than the retention window.
    pub fn is_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at >= retention
    }

    fn ensure_not_terminal(&self) -> ModelResult<()> {
        if self.is_terminal() {
            return Err(ModelError::AlreadyTerminal(self.status));
        }
        Ok(())
    }
}

/// Payload sent to the downstream webhook on terminal transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobNotification {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl JobNotification {
    /// Build the notification for a terminal job. Returns None while processing.
    pub fn from_job(job: &RenderJob) -> Option<Self> {
        if !job.is_terminal() {
            return None;
        }
        let result = job.result.as_ref();
        Some(Self {
            job_id: job.id.to_string(),
            status: job.status,
            video_url: result.and_then(|r| r.url.clone()),
            title: result.map(|r| r.title.clone()),
            duration_seconds: result.map(|r| r.duration_seconds),
        })
    }
}
