//! HTTP render service client.
//!
//! The remote renderer is reached through a single endpoint (for example a
//! function URL) accepting `{"type": "start", ...}` and
//! `{"type": "status", ...}` payloads.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use mstudio_models::{OutputLocation, RenderHandle, RenderProgress, RenderRequest};

use crate::error::{WorkerError, WorkerResult};
use crate::remote::RenderDispatcher;

/// Message used when the service reports a fatal error without details.
const FALLBACK_FAILURE: &str = "Remote render failed";

#[derive(Debug, Clone)]
pub struct RenderServiceConfig {
    pub endpoint: String,
    /// Sent as a bearer token when set
    pub token: Option<String>,
    pub timeout: Duration,
}

impl RenderServiceConfig {
    pub fn from_env() -> WorkerResult<Self> {
        let endpoint = std::env::var("RENDER_SERVICE_URL")
            .map_err(|_| WorkerError::config("RENDER_SERVICE_URL not set"))?;

        Ok(Self {
            endpoint,
            token: std::env::var("RENDER_SERVICE_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("RENDER_SERVICE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        })
    }
}

pub struct HttpRenderDispatcher {
    config: RenderServiceConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum RenderCall<'a> {
    #[serde(rename = "start", rename_all = "camelCase")]
    Start {
        serve_url: &'a str,
        composition: &'a str,
        input_props: &'a Value,
        codec: &'a str,
        bucket_name: &'a str,
        timeout_in_milliseconds: u64,
        frames_per_lambda: u32,
    },
    #[serde(rename = "status", rename_all = "camelCase")]
    Status {
        render_id: &'a str,
        bucket_name: &'a str,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    render_id: String,
    bucket_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(default)]
    overall_progress: f64,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    fatal_error_encountered: bool,
    #[serde(default)]
    errors: Vec<RenderErrorInfo>,
    out_key: Option<String>,
    out_bucket: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RenderErrorInfo {
    message: Option<String>,
}

impl StatusResponse {
    fn into_progress(self, handle: &RenderHandle) -> RenderProgress {
        let fatal_error = self.fatal_error_encountered.then(|| {
            self.errors
                .iter()
                .find_map(|e| e.message.clone())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| FALLBACK_FAILURE.to_string())
        });

        let output = match (self.done, self.out_key) {
            (true, Some(key)) => Some(OutputLocation {
                bucket: self
                    .out_bucket
                    .unwrap_or_else(|| handle.bucket_name.clone()),
                key,
            }),
            _ => None,
        };

        RenderProgress {
            overall_progress: self.overall_progress.clamp(0.0, 1.0),
            done: self.done,
            fatal_error,
            output,
        }
    }
}

impl HttpRenderDispatcher {
    pub fn new(config: RenderServiceConfig) -> WorkerResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> WorkerResult<Self> {
        Self::new(RenderServiceConfig::from_env()?)
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, payload: &RenderCall<'_>) -> WorkerResult<T> {
        let mut request = self.client.post(&self.config.endpoint).json(payload);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WorkerError::render(format!("render service unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            return Err(WorkerError::render(format!(
                "render service returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| WorkerError::render(format!("unreadable render service response: {}", e)))
    }
}

#[async_trait]
impl RenderDispatcher for HttpRenderDispatcher {
    async fn start(&self, bucket_name: &str, request: &RenderRequest) -> WorkerResult<RenderHandle> {
        let started: StartResponse = self
            .call(&RenderCall::Start {
                serve_url: &request.serve_url,
                composition: &request.composition,
                input_props: &request.input_props,
                codec: &request.codec,
                bucket_name,
                timeout_in_milliseconds: request.limits.timeout_ms,
                frames_per_lambda: request.limits.frames_per_worker,
            })
            .await?;

        info!(render_id = %started.render_id, composition = %request.composition, "Render started");
        Ok(RenderHandle {
            render_id: started.render_id,
            bucket_name: started
                .bucket_name
                .unwrap_or_else(|| bucket_name.to_string()),
        })
    }

    async fn progress(&self, handle: &RenderHandle) -> WorkerResult<RenderProgress> {
        let status: StatusResponse = self
            .call(&RenderCall::Status {
                render_id: &handle.render_id,
                bucket_name: &handle.bucket_name,
            })
            .await?;

        let progress = status.into_progress(handle);
        debug!(
            render_id = %handle.render_id,
            percent = progress.percent(),
            done = progress.done,
            "Render status"
        );
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstudio_models::RenderLimits;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher(server: &MockServer) -> HttpRenderDispatcher {
        HttpRenderDispatcher::new(RenderServiceConfig {
            endpoint: server.uri(),
            token: Some("secret".to_string()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn handle() -> RenderHandle {
        RenderHandle {
            render_id: "r-1".to_string(),
            bucket_name: "mstudio-us-east-1-abc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_sends_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "type": "start",
                "serveUrl": "https://b.s3.us-east-1.amazonaws.com/sites/ms-render-1/index.html",
                "composition": "MainVideo",
                "codec": "h264",
                "bucketName": "b",
                "timeoutInMilliseconds": 120000,
                "framesPerLambda": 20
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "renderId": "r-1",
                "bucketName": "b"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = RenderRequest {
            serve_url: "https://b.s3.us-east-1.amazonaws.com/sites/ms-render-1/index.html".into(),
            composition: "MainVideo".into(),
            input_props: json!({}),
            codec: "h264".into(),
            limits: RenderLimits {
                timeout_ms: 120_000,
                frames_per_worker: 20,
            },
        };
        let handle = dispatcher(&server).start("b", &request).await.unwrap();
        assert_eq!(handle.render_id, "r-1");
        assert_eq!(handle.bucket_name, "b");
    }

    #[tokio::test]
    async fn test_progress_done_defaults_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "type": "status", "renderId": "r-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "overallProgress": 1.0,
                "done": true,
                "fatalErrorEncountered": false,
                "errors": [],
                "outKey": "renders/r-1/out.mp4"
            })))
            .mount(&server)
            .await;

        let progress = dispatcher(&server).progress(&handle()).await.unwrap();
        assert!(progress.done);
        let output = progress.output.unwrap();
        assert_eq!(output.bucket, "mstudio-us-east-1-abc");
        assert_eq!(output.key, "renders/r-1/out.mp4");
    }

    #[test]
    fn test_fatal_error_message() {
        let status = StatusResponse {
            overall_progress: 0.4,
            done: false,
            fatal_error_encountered: true,
            errors: vec![RenderErrorInfo {
                message: Some("Chunk 3 timed out".to_string()),
            }],
            out_key: None,
            out_bucket: None,
        };
        let progress = status.into_progress(&handle());
        assert_eq!(progress.fatal_error.as_deref(), Some("Chunk 3 timed out"));

        let bare = StatusResponse {
            overall_progress: 0.4,
            done: false,
            fatal_error_encountered: true,
            errors: vec![],
            out_key: None,
            out_bucket: None,
        };
        assert_eq!(
            bare.into_progress(&handle()).fatal_error.as_deref(),
            Some(FALLBACK_FAILURE)
        );
    }

    #[tokio::test]
    async fn test_service_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = dispatcher(&server).progress(&handle()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Render(_)));
    }
}
