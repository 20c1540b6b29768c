//! Shared data models for the Motion Studio backend.
//!
//! This crate provides Serde-serializable types for:
//! - Timestamped words and word groups (caption timing)
//! - Render jobs and their terminal transitions
//! - Scene definitions, deployed sites and render handles
//! - Request/response schemas for the HTTP surface

pub mod error;
pub mod job;
pub mod request;
pub mod scene;
pub mod word;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use job::{JobId, JobKind, JobNotification, JobResult, JobStatus, JobStep, RenderJob};
pub use request::{
    CaptionMode, CaptionRequest, EmojiCue, GenerateRequest, SubmitResponse,
    DEFAULT_CAPTION_STYLE, MAX_EMOJI_CUES, MAX_PROMPT_CHARS, MAX_STYLE_ID_CHARS,
};
pub use scene::{
    BucketProvision, DeployedSite, OutputLocation, RenderHandle, RenderLimits, RenderProgress,
    RenderRequest, SceneCode, SceneDefinition,
};
pub use word::{TimestampedWord, WordGroup};
