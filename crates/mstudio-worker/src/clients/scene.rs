//! Anthropic Messages API client producing scene definitions.
//!
//! The model is forced to answer through a single tool call whose input
//! carries the component source and timing, so the response never has to
//! be scraped out of free text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use mstudio_models::{SceneCode, SceneDefinition};

use crate::error::{WorkerError, WorkerResult};
use crate::remote::SceneDescriber;

const TOOL_NAME: &str = "create_remotion_composition";
const SYSTEM_PROMPT: &str = include_str!("../../assets/scene_system_prompt.md");
const API_VERSION: &str = "2023-06-01";

/// Composition id registered by the generated root.
pub const SCENE_COMPOSITION_ID: &str = "MainVideo";
const DEFAULT_FPS: u32 = 30;
const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn from_env() -> WorkerResult<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| WorkerError::config("ANTHROPIC_API_KEY not set"))?;

        Ok(Self {
            api_key,
            model: std::env::var("CLAUDE_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-latest".to_string()),
            base_url: std::env::var("ANTHROPIC_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            max_tokens: std::env::var("CLAUDE_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16_000),
            timeout: Duration::from_secs(
                std::env::var("CLAUDE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        })
    }
}

/// [`SceneDescriber`] backed by the Anthropic Messages API.
pub struct AnthropicSceneDescriber {
    config: AnthropicConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    tools: Vec<Tool>,
    tool_choice: ToolChoice,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse { name: String, input: Value },
    #[serde(other)]
    Other,
}

/// Raw tool input; every field is checked before use.
#[derive(Debug, Deserialize)]
struct CompositionInput {
    component_code: Option<Value>,
    duration_in_frames: Option<Value>,
    fps: Option<Value>,
    title: Option<Value>,
}

impl AnthropicSceneDescriber {
    pub fn new(config: AnthropicConfig) -> WorkerResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> WorkerResult<Self> {
        Self::new(AnthropicConfig::from_env()?)
    }

    fn build_request<'a>(&'a self, prompt: &str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: SYSTEM_PROMPT,
            tools: vec![Tool {
                name: TOOL_NAME,
                description: "Create a complete Remotion video composition",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "component_code": {
                            "type": "string",
                            "description": "Raw JSX source of MainComposition, imports first, no markdown fences, under 8000 characters."
                        },
                        "duration_in_frames": {
                            "type": "number",
                            "description": "Total duration in frames. Use 150."
                        },
                        "fps": {
                            "type": "number",
                            "description": "Frames per second. Use 30."
                        },
                        "title": {
                            "type": "string",
                            "description": "Short title, at most 60 characters."
                        }
                    },
                    "required": ["component_code", "duration_in_frames", "fps", "title"]
                }),
            }],
            tool_choice: ToolChoice {
                kind: "tool",
                name: TOOL_NAME,
            },
            messages: vec![Message {
                role: "user",
                content: format!(
                    "Create a clean, elegant motion design video for this brief:\n\n\"{}\"\n\n\
                     Keep it light: under 8000 characters, no SVG, no heavy per-frame math, \
                     at most 8 animated elements.",
                    prompt
                ),
            }],
        }
    }
}

#[async_trait]
impl SceneDescriber for AnthropicSceneDescriber {
    async fn describe(&self, prompt: &str) -> WorkerResult<SceneDefinition> {
        let preview: String = prompt.chars().take(80).collect();
        info!(model = %self.config.model, "Generating scene for \"{}\"", preview);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| WorkerError::scene_generation(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            return Err(WorkerError::scene_generation(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let message: MessagesResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::scene_generation(format!("unreadable response: {}", e)))?;

        let input = message
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::ToolUse { name, input } if name == TOOL_NAME => Some(input),
                _ => None,
            })
            .ok_or_else(|| {
                warn!("Model answered without calling {}", TOOL_NAME);
                WorkerError::scene_generation("model did not call the composition tool")
            })?;

        let scene = parse_tool_input(input)?;
        debug!(
            title = %scene.title,
            frames = scene.duration_in_frames,
            fps = scene.fps,
            code_chars = scene.code.source().len(),
            "Scene generated"
        );
        Ok(scene)
    }
}

/// Positive whole number of frames from a JSON number.
fn positive_frames(value: &Value) -> Option<u32> {
    let n = value.as_f64()?;
    if !n.is_finite() || n < 1.0 {
        return None;
    }
    Some(n.round().min(u32::MAX as f64) as u32)
}

fn parse_tool_input(input: Value) -> WorkerResult<SceneDefinition> {
    let input: CompositionInput = serde_json::from_value(input)
        .map_err(|e| WorkerError::scene_generation(format!("malformed tool input: {}", e)))?;

    let code = match input.component_code {
        Some(Value::String(code)) if !code.trim().is_empty() => code,
        other => {
            return Err(WorkerError::scene_generation(format!(
                "empty or missing component_code (got {})",
                other.unwrap_or(Value::Null)
            )))
        }
    };

    let duration_in_frames = input
        .duration_in_frames
        .as_ref()
        .and_then(positive_frames)
        .ok_or_else(|| {
            WorkerError::scene_generation(format!(
                "invalid duration_in_frames: {}",
                input.duration_in_frames.clone().unwrap_or(Value::Null)
            ))
        })?;

    let fps = match &input.fps {
        None | Some(Value::Null) => DEFAULT_FPS,
        Some(value) => positive_frames(value)
            .ok_or_else(|| WorkerError::scene_generation(format!("invalid fps: {}", value)))?,
    };

    let title = input
        .title
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();

    Ok(SceneDefinition {
        code: SceneCode::Component { source: code },
        composition_id: SCENE_COMPOSITION_ID.to_string(),
        duration_in_frames,
        fps,
        width: SceneDefinition::DEFAULT_WIDTH,
        height: SceneDefinition::DEFAULT_HEIGHT,
        title,
        input_props: json!({}),
    })
}
