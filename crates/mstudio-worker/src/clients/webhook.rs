//! Webhook notifier for terminal job transitions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use mstudio_models::JobNotification;

use crate::error::{WorkerError, WorkerResult};
use crate::remote::Notifier;
use crate::retry::{retry_async, RetryConfig};

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl WebhookConfig {
    /// Returns `None` when `NOTIFY_WEBHOOK_URL` is unset.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("NOTIFY_WEBHOOK_URL").ok().filter(|u| !u.is_empty())?;
        Some(Self {
            url,
            token: std::env::var("NOTIFY_WEBHOOK_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(10),
            max_retries: std::env::var("NOTIFY_WEBHOOK_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        })
    }
}

#[derive(Debug, Error)]
enum DeliveryError {
    #[error("webhook unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("webhook returned {0}")]
    Status(StatusCode),
}

impl DeliveryError {
    /// Client errors will not change on a second attempt.
    fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Unreachable(_) => true,
            DeliveryError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

/// POSTs [`JobNotification`] JSON, optionally with a bearer token.
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> WorkerResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    async fn deliver(&self, notification: &JobNotification) -> Result<(), DeliveryError> {
        let mut request = self.client.post(&self.config.url).json(notification);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(DeliveryError::Status(response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &JobNotification) -> WorkerResult<()> {
        let retry = RetryConfig::new("webhook_notify").with_max_retries(self.config.max_retries);

        retry_async(&retry, DeliveryError::is_retryable, || self.deliver(notification))
            .await
            .map_err(|e| WorkerError::notify(e.to_string()))?;

        debug!(job_id = %notification.job_id, status = %notification.status, "Webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstudio_models::JobStatus;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer, token: Option<&str>) -> WebhookNotifier {
        WebhookNotifier::new(WebhookConfig {
            url: format!("{}/hooks/render", server.uri()),
            token: token.map(str::to_string),
            timeout: Duration::from_secs(5),
            max_retries: 2,
        })
        .unwrap()
    }

    fn done() -> JobNotification {
        JobNotification {
            job_id: "job-1".to_string(),
            status: JobStatus::Done,
            video_url: Some("http://localhost:3000/videos/job-1.mp4".to_string()),
            title: Some("Sunrise".to_string()),
            duration_seconds: Some(5.0),
        }
    }

    #[tokio::test]
    async fn test_delivers_payload_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/render"))
            .and(header("authorization", "Bearer hook-token"))
            .and(body_json(json!({
                "job_id": "job-1",
                "status": "done",
                "video_url": "http://localhost:3000/videos/job-1.mp4",
                "title": "Sunrise",
                "duration_seconds": 5.0
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server, Some("hook-token")).notify(&done()).await.unwrap();
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let err = notifier(&server, None).notify(&done()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Notify(_)));
    }

    #[tokio::test]
    async fn test_server_error_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        assert!(notifier(&server, None).notify(&done()).await.is_err());
    }
}
