//! Production implementations of the collaborator traits.

pub mod render_service;
pub mod s3;
pub mod scene;
pub mod transcription;
pub mod webhook;

pub use render_service::{HttpRenderDispatcher, RenderServiceConfig};
pub use s3::{S3ArtifactRetriever, S3Provisioner, S3SiteDeployer};
pub use scene::{AnthropicConfig, AnthropicSceneDescriber, SCENE_COMPOSITION_ID};
pub use transcription::{TranscriptionConfig, WhisperTranscriber};
pub use webhook::{WebhookConfig, WebhookNotifier};
