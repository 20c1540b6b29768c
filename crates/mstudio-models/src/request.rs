//! Request and response schemas for job submission.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ModelError, ModelResult};
use crate::job::{JobId, JobStatus};

/// Maximum prompt length in characters.
pub const MAX_PROMPT_CHARS: usize = 2000;

/// Maximum caption style id length.
pub const MAX_STYLE_ID_CHARS: usize = 64;

/// Maximum number of emoji cues per caption job.
pub const MAX_EMOJI_CUES: usize = 200;

/// Default caption style id.
pub const DEFAULT_CAPTION_STYLE: &str = "heat";

/// Request body for prompt-driven renders.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerateRequest {
    pub prompt: String,
}

impl GenerateRequest {
    /// Validate and return the trimmed prompt.
    pub fn validate(&self) -> ModelResult<String> {
        let trimmed = self.prompt.trim();
        if trimmed.is_empty() {
            return Err(ModelError::validation(
                "Body must contain a non-empty \"prompt\" string.",
            ));
        }
        if self.prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(ModelError::validation(format!(
                "Prompt must be under {} characters.",
                MAX_PROMPT_CHARS
            )));
        }
        Ok(trimmed.to_string())
    }
}

/// How captions get onto the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptionMode {
    /// Render through the remote composition backend
    #[default]
    Remote,
    /// Burn SubRip subtitles locally with ffmpeg
    Burn,
}

/// Emoji overlay shown for a short window starting at `start_frame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmojiCue {
    pub start_frame: u32,
    pub emoji_url: String,
}

/// Request body for caption jobs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptionRequest {
    pub video_url: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub mode: CaptionMode,
    #[serde(default)]
    pub emoji_cues: Vec<EmojiCue>,
}

fn default_style() -> String {
    DEFAULT_CAPTION_STYLE.to_string()
}

impl CaptionRequest {
    /// Validate the request.
    pub fn validate(&self) -> ModelResult<()> {
        let url = Url::parse(self.video_url.trim())
            .map_err(|e| ModelError::validation(format!("Invalid video_url: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ModelError::validation("video_url must be an http(s) URL"));
        }

        let style = self.style.trim();
        if style.is_empty() {
            return Err(ModelError::validation("style must not be empty"));
        }
        if style.len() > MAX_STYLE_ID_CHARS {
            return Err(ModelError::validation(format!(
                "style must be at most {} characters",
                MAX_STYLE_ID_CHARS
            )));
        }
        if !style
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ModelError::validation("style contains invalid characters"));
        }

        if self.emoji_cues.len() > MAX_EMOJI_CUES {
            return Err(ModelError::validation(format!(
                "At most {} emoji cues are allowed",
                MAX_EMOJI_CUES
            )));
        }
        for cue in &self.emoji_cues {
            Url::parse(&cue.emoji_url)
                .map_err(|e| ModelError::validation(format!("Invalid emoji_url: {}", e)))?;
        }

        Ok(())
    }
}

/// Immediate response to a submission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

impl SubmitResponse {
    pub fn processing(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Processing,
        }
    }
}
