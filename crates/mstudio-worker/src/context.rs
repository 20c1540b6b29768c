//! Shared state handed to every job task.

use std::sync::Arc;

use mstudio_media::{FfmpegToolkit, MediaToolkit, StyleRegistry};
use mstudio_models::{CaptionRequest, JobId, JobKind};
use mstudio_queue::{InMemoryJobStore, JobStore, RedisJobStore, RedisStoreConfig};
use mstudio_storage::S3Client;
use tracing::info;

use crate::bundle::Bundler;
use crate::clients::{
    AnthropicSceneDescriber, HttpRenderDispatcher, S3ArtifactRetriever, S3Provisioner,
    S3SiteDeployer, WebhookConfig, WebhookNotifier, WhisperTranscriber,
};
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::remote::{
    ArtifactRetriever, NoopNotifier, Notifier, RenderDispatcher, ResourceProvisioner,
    SceneDescriber, SiteDeployer, Transcriber,
};

/// Work item carried by the task queue.
#[derive(Debug, Clone)]
pub enum JobTask {
    Render { job_id: JobId, prompt: String },
    Captions { job_id: JobId, request: CaptionRequest },
}

impl JobTask {
    pub fn job_id(&self) -> &JobId {
        match self {
            JobTask::Render { job_id, .. } | JobTask::Captions { job_id, .. } => job_id,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobTask::Render { .. } => JobKind::Render,
            JobTask::Captions { .. } => JobKind::Captions,
        }
    }
}

/// External systems a job talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub scenes: Arc<dyn SceneDescriber>,
    pub transcriber: Arc<dyn Transcriber>,
    pub provisioner: Arc<dyn ResourceProvisioner>,
    pub deployer: Arc<dyn SiteDeployer>,
    pub dispatcher: Arc<dyn RenderDispatcher>,
    pub retriever: Arc<dyn ArtifactRetriever>,
    pub notifier: Arc<dyn Notifier>,
    pub media: Arc<dyn MediaToolkit>,
}

impl Collaborators {
    /// Production clients configured from the environment.
    pub async fn from_env(config: &WorkerConfig) -> WorkerResult<Self> {
        let s3 = S3Client::from_env().await?;
        let bundler = Bundler::new(config.bundle_command.clone(), config.bundle_timeout);

        let notifier: Arc<dyn Notifier> = match WebhookConfig::from_env() {
            Some(webhook) => {
                info!(url = %webhook.url, "Job notifications enabled");
                Arc::new(WebhookNotifier::new(webhook)?)
            }
            None => Arc::new(NoopNotifier),
        };

        Ok(Self {
            scenes: Arc::new(AnthropicSceneDescriber::from_env()?),
            transcriber: Arc::new(WhisperTranscriber::from_env()?),
            provisioner: Arc::new(S3Provisioner::new(s3.clone(), config.bucket_prefix.clone())),
            deployer: Arc::new(S3SiteDeployer::new(s3.clone(), bundler)),
            dispatcher: Arc::new(HttpRenderDispatcher::from_env()?),
            retriever: Arc::new(S3ArtifactRetriever::new(s3)),
            notifier,
            media: Arc::new(FfmpegToolkit::new(
                reqwest::Client::new(),
                config.ffmpeg_timeout_secs,
            )),
        })
    }
}

/// Redis when `REDIS_URL` is set, otherwise process memory.
pub async fn open_job_store(config: &WorkerConfig) -> WorkerResult<Arc<dyn JobStore>> {
    match RedisStoreConfig::from_env(config.retention_window()) {
        Some(redis) => {
            let store = RedisJobStore::new(redis)?;
            store.ping().await?;
            info!("Using Redis job store");
            Ok(Arc::new(store))
        }
        None => {
            info!("Using in-memory job store");
            Ok(Arc::new(InMemoryJobStore::new()))
        }
    }
}

/// Everything a running job can reach.
pub struct JobContext {
    pub config: Arc<WorkerConfig>,
    pub store: Arc<dyn JobStore>,
    pub styles: Arc<StyleRegistry>,
    pub collaborators: Collaborators,
}
