//! Scene directory scaffolding.
//!
//! A scene directory holds the composition source, a root descriptor
//! registering it under the scene's composition id, and the entry point
//! handed to the bundler.

use std::path::{Path, PathBuf};

use tracing::debug;

use mstudio_models::SceneDefinition;

use crate::error::{WorkerError, WorkerResult};

pub const ROOT_FILE: &str = "Root.jsx";
pub const ENTRY_FILE: &str = "index.jsx";

/// Root descriptor source for `scene`.
pub fn root_source(scene: &SceneDefinition) -> WorkerResult<String> {
    let module = scene
        .code
        .file_name()
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(scene.code.file_name());
    let default_props = serde_json::to_string(&scene.input_props)?;

    Ok(format!(
        r#"import {{ Composition }} from 'remotion';
import {{ {component} }} from './{module}';

export const RemotionRoot = () => (
  <Composition
    id="{id}"
    component={{{component}}}
    durationInFrames={{{frames}}}
    fps={{{fps}}}
    width={{{width}}}
    height={{{height}}}
    defaultProps={{{props}}}
  />
);
"#,
        component = scene.code.component_name(),
        module = module,
        id = scene.composition_id,
        frames = scene.duration_in_frames,
        fps = scene.fps,
        width = scene.width,
        height = scene.height,
        props = default_props,
    ))
}

const ENTRY_SOURCE: &str = "import { registerRoot } from 'remotion';\n\
import { RemotionRoot } from './Root';\n\
\n\
registerRoot(RemotionRoot);\n";

/// Write the scene files into `scene_dir`. Returns the entry point path.
pub async fn write_site(scene_dir: &Path, scene: &SceneDefinition) -> WorkerResult<PathBuf> {
    let file_name = scene.code.file_name();
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
        return Err(WorkerError::validation(format!(
            "invalid composition file name '{}'",
            file_name
        )));
    }
    if file_name == ROOT_FILE || file_name == ENTRY_FILE {
        return Err(WorkerError::validation(format!(
            "composition file name '{}' is reserved",
            file_name
        )));
    }

    tokio::fs::create_dir_all(scene_dir).await?;
    tokio::fs::write(scene_dir.join(file_name), scene.code.source()).await?;
    tokio::fs::write(scene_dir.join(ROOT_FILE), root_source(scene)?).await?;

    let entry = scene_dir.join(ENTRY_FILE);
    tokio::fs::write(&entry, ENTRY_SOURCE).await?;

    debug!(dir = ?scene_dir, composition = %scene.composition_id, "Scene files written");
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstudio_models::SceneCode;
    use serde_json::json;
    use tempfile::TempDir;

    fn component_scene() -> SceneDefinition {
        SceneDefinition {
            code: SceneCode::Component {
                source: "export const MainComposition = () => null;".to_string(),
            },
            composition_id: "MainVideo".to_string(),
            duration_in_frames: 150,
            fps: 30,
            width: 1280,
            height: 720,
            title: "Sunrise".to_string(),
            input_props: json!({}),
        }
    }

    #[test]
    fn test_root_source_for_component() {
        let root = root_source(&component_scene()).unwrap();
        assert!(root.contains("import { MainComposition } from './Component';"));
        assert!(root.contains(r#"id="MainVideo""#));
        assert!(root.contains("durationInFrames={150}"));
        assert!(root.contains("width={1280}"));
        assert!(root.contains("defaultProps={{}}"));
    }

    #[test]
    fn test_root_source_for_template() {
        let scene = SceneDefinition {
            code: SceneCode::Template {
                file_name: "CaptionsComposition.jsx".to_string(),
                source: "export const CaptionsComposition = () => null;".to_string(),
            },
            composition_id: "CaptionsVideo".to_string(),
            input_props: json!({ "videoUrl": "https://cdn.example.com/a.mp4" }),
            ..component_scene()
        };
        let root = root_source(&scene).unwrap();
        assert!(root.contains("import { CaptionsComposition } from './CaptionsComposition';"));
        assert!(root.contains(r#""videoUrl":"https://cdn.example.com/a.mp4""#));
    }

    #[tokio::test]
    async fn test_write_site_files() {
        let dir = TempDir::new().unwrap();
        let scene_dir = dir.path().join("scene");

        let entry = write_site(&scene_dir, &component_scene()).await.unwrap();
        assert_eq!(entry, scene_dir.join("index.jsx"));
        assert!(scene_dir.join("Component.jsx").exists());
        assert!(scene_dir.join("Root.jsx").exists());

        let index = std::fs::read_to_string(entry).unwrap();
        assert!(index.contains("registerRoot(RemotionRoot);"));
    }

    #[tokio::test]
    async fn test_write_site_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let scene = SceneDefinition {
            code: SceneCode::Template {
                file_name: "../escape.jsx".to_string(),
                source: "x".to_string(),
            },
            ..component_scene()
        };
        assert!(write_site(dir.path(), &scene).await.is_err());
    }
}
