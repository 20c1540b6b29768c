//! Scene definitions and remote render types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Renderable scene payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneCode {
    /// Generated component source (JSX exporting `MainComposition`)
    Component { source: String },
    /// Pre-built composition template driven entirely by `input_props`
    Template { file_name: String, source: String },
}

impl SceneCode {
    /// File name the code is written to inside the scene directory.
    pub fn file_name(&self) -> &str {
        match self {
            SceneCode::Component { .. } => "Component.jsx",
            SceneCode::Template { file_name, .. } => file_name,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            SceneCode::Component { source } | SceneCode::Template { source, .. } => source,
        }
    }

    /// Name of the exported component the root descriptor mounts.
    pub fn component_name(&self) -> &str {
        match self {
            SceneCode::Component { .. } => "MainComposition",
            SceneCode::Template { file_name, .. } => {
                file_name.split('.').next().unwrap_or(file_name)
            }
        }
    }
}

/// A scene ready to be deployed and rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneDefinition {
    pub code: SceneCode,
    /// Composition id registered by the root descriptor
    pub composition_id: String,
    pub duration_in_frames: u32,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub title: String,
    /// Props handed to the composition at render time
    #[serde(default)]
    pub input_props: serde_json::Value,
}

impl SceneDefinition {
    /// Default frame size for generated scenes.
    pub const DEFAULT_WIDTH: u32 = 1280;
    pub const DEFAULT_HEIGHT: u32 = 720;

    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.fps == 0 {
            return 0.0;
        }
        self.duration_in_frames as f64 / self.fps as f64
    }

    /// Check the scene is renderable. Must pass before any remote dispatch.
    pub fn validate(&self) -> ModelResult<()> {
        if self.duration_in_frames == 0 {
            return Err(ModelError::invalid_scene("duration_in_frames must be > 0"));
        }
        if self.fps == 0 {
            return Err(ModelError::invalid_scene("fps must be > 0"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ModelError::invalid_scene(format!(
                "invalid frame size {}x{}",
                self.width, self.height
            )));
        }
        if self.code.source().trim().is_empty() {
            return Err(ModelError::invalid_scene("scene code is empty"));
        }
        let id_ok = !self.composition_id.is_empty()
            && self
                .composition_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !id_ok {
            return Err(ModelError::invalid_scene(format!(
                "invalid composition id '{}'",
                self.composition_id
            )));
        }
        Ok(())
    }
}

/// Outcome of idempotent bucket acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketProvision {
    pub bucket_name: String,
    pub region: String,
    /// True when the bucket was found, false when freshly created
    pub already_existed: bool,
}

/// A transient, job-scoped site deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedSite {
    pub site_name: String,
    pub bucket_name: String,
    pub serve_url: String,
}

/// Hard limits passed along with a render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderLimits {
    /// Wall-clock timeout enforced by the remote side (milliseconds)
    pub timeout_ms: u64,
    /// Frames rendered by each remote worker unit
    pub frames_per_worker: u32,
}

/// A single render submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub serve_url: String,
    pub composition: String,
    pub input_props: serde_json::Value,
    pub codec: String,
    pub limits: RenderLimits,
}

/// Handle returned by the dispatcher, used only for polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderHandle {
    pub render_id: String,
    pub bucket_name: String,
}

/// Where the finished artifact lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLocation {
    pub bucket: String,
    pub key: String,
}

/// Snapshot of remote render progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderProgress {
    /// Overall progress in `0.0..=1.0`
    pub overall_progress: f64,
    pub done: bool,
    pub fatal_error: Option<String>,
    pub output: Option<OutputLocation>,
}

impl RenderProgress {
    /// Progress as an integer percentage.
    pub fn percent(&self) -> u8 {
        (self.overall_progress.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> SceneDefinition {
        SceneDefinition {
            code: SceneCode::Component {
                source: "export const MainComposition = () => null;".into(),
            },
            composition_id: "MainVideo".into(),
            duration_in_frames: 150,
            fps: 30,
            width: SceneDefinition::DEFAULT_WIDTH,
            height: SceneDefinition::DEFAULT_HEIGHT,
            title: "Test".into(),
            input_props: serde_json::json!({}),
        }
    }

    #[test]
    fn test_valid_scene() {
        let s = scene();
        assert!(s.validate().is_ok());
        assert_eq!(s.duration_seconds(), 5.0);
        assert_eq!(s.code.file_name(), "Component.jsx");
        assert_eq!(s.code.component_name(), "MainComposition");
    }

    #[test]
    fn test_zero_duration_or_fps_rejected() {
        let mut s = scene();
        s.duration_in_frames = 0;
        assert!(matches!(s.validate(), Err(ModelError::InvalidScene(_))));

        let mut s = scene();
        s.fps = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_empty_code_rejected() {
        let mut s = scene();
        s.code = SceneCode::Component { source: "  ".into() };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_template_component_name() {
        let code = SceneCode::Template {
            file_name: "CaptionsComposition.jsx".into(),
            source: "x".into(),
        };
        assert_eq!(code.component_name(), "CaptionsComposition");
    }

    #[test]
    fn test_progress_percent() {
        let p = RenderProgress {
            overall_progress: 0.424,
            done: false,
            fatal_error: None,
            output: None,
        };
        assert_eq!(p.percent(), 42);
    }
}
