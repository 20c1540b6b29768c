//! Collaborator seams of the job workflow.
//!
//! Each external system the orchestrator talks to sits behind one of these
//! traits. Production implementations live in [`crate::clients`]; tests use
//! the generated mocks.

use std::path::Path;

use async_trait::async_trait;

use mstudio_models::{
    BucketProvision, DeployedSite, JobNotification, OutputLocation, RenderHandle, RenderProgress,
    RenderRequest, SceneDefinition, TimestampedWord,
};

use crate::error::WorkerResult;

/// Turns a prompt into a renderable scene.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SceneDescriber: Send + Sync {
    async fn describe(&self, prompt: &str) -> WorkerResult<SceneDefinition>;
}

/// Speech to word-level timestamps.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Words sorted by start time. An empty list means no speech.
    async fn transcribe(&self, audio: &Path) -> WorkerResult<Vec<TimestampedWord>>;
}

/// Idempotent acquisition of the render bucket.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    async fn ensure_bucket(&self) -> WorkerResult<BucketProvision>;
}

/// Publishes a scene directory as a transient site.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SiteDeployer: Send + Sync {
    /// Bundle `entry_point` into `bundle_dir` and upload it as `site_name`.
    async fn deploy(
        &self,
        bucket: &BucketProvision,
        site_name: &str,
        entry_point: &Path,
        bundle_dir: &Path,
    ) -> WorkerResult<DeployedSite>;

    async fn delete(&self, site: &DeployedSite) -> WorkerResult<()>;
}

/// Starts remote renders and reports their progress.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RenderDispatcher: Send + Sync {
    async fn start(&self, bucket_name: &str, request: &RenderRequest) -> WorkerResult<RenderHandle>;

    async fn progress(&self, handle: &RenderHandle) -> WorkerResult<RenderProgress>;
}

/// Moves a finished artifact to local disk.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactRetriever: Send + Sync {
    /// Stream `output` into `dest`. Returns the byte count.
    async fn retrieve(&self, output: &OutputLocation, dest: &Path) -> WorkerResult<u64>;
}

/// Tells a downstream system that a job finished.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &JobNotification) -> WorkerResult<()>;
}

/// Notifier used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &JobNotification) -> WorkerResult<()> {
        Ok(())
    }
}
