//! Per-job resource tracking and release.
//!
//! Every resource a job acquires is registered here as soon as it exists.
//! The executor calls [`JobResources::release`] after the workflow ends,
//! whether it returned, failed or panicked. Release failures are logged
//! and never change the job outcome.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use mstudio_models::DeployedSite;

use crate::logging::JobLogger;
use crate::metrics;
use crate::remote::SiteDeployer;

#[derive(Debug)]
pub struct JobResources {
    job_dir: PathBuf,
    site: Option<DeployedSite>,
    /// Removed unless the job succeeds
    pending_output: Option<PathBuf>,
}

/// What release actually managed to clean up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReleaseReport {
    pub site_deleted: bool,
    pub work_dir_removed: bool,
    pub partial_output_removed: bool,
}

impl JobResources {
    pub fn new(job_dir: PathBuf) -> Self {
        Self {
            job_dir,
            site: None,
            pending_output: None,
        }
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    /// Composition source, root descriptor and entry point.
    pub fn scene_dir(&self) -> PathBuf {
        self.job_dir.join("scene")
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.job_dir.join("bundle")
    }

    /// Downloaded source, extracted audio and subtitle files.
    pub fn media_dir(&self) -> PathBuf {
        self.job_dir.join("media")
    }

    pub async fn create_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.scene_dir()).await?;
        tokio::fs::create_dir_all(self.media_dir()).await
    }

    /// Register a site that is about to be uploaded. Its URL is unknown yet.
    pub fn track_pending_site(&mut self, site_name: &str, bucket_name: &str) {
        self.site = Some(DeployedSite {
            site_name: site_name.to_string(),
            bucket_name: bucket_name.to_string(),
            serve_url: String::new(),
        });
    }

    pub fn track_site(&mut self, site: DeployedSite) {
        self.site = Some(site);
    }

    pub fn site(&self) -> Option<&DeployedSite> {
        self.site.as_ref()
    }

    /// Register an output file that must not survive a failed job.
    pub fn track_output(&mut self, path: PathBuf) {
        self.pending_output = Some(path);
    }

    /// Release everything. `succeeded` keeps the tracked output in place.
    pub async fn release(
        self,
        deployer: &dyn SiteDeployer,
        logger: &JobLogger,
        succeeded: bool,
    ) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        if let Some(site) = &self.site {
            match deployer.delete(site).await {
                Ok(()) => report.site_deleted = true,
                Err(e) => {
                    metrics::record_cleanup_failure("site");
                    logger.log_warning(&format!(
                        "Failed to delete site {}: {}",
                        site.site_name, e
                    ));
                }
            }
        }

        match tokio::fs::remove_dir_all(&self.job_dir).await {
            Ok(()) => report.work_dir_removed = true,
            Err(e) if e.kind() == ErrorKind::NotFound => report.work_dir_removed = true,
            Err(e) => {
                metrics::record_cleanup_failure("work_dir");
                logger.log_warning(&format!(
                    "Failed to remove {}: {}",
                    self.job_dir.display(),
                    e
                ));
            }
        }

        if !succeeded {
            if let Some(output) = &self.pending_output {
                match tokio::fs::remove_file(output).await {
                    Ok(()) => report.partial_output_removed = true,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => logger.log_warning(&format!(
                        "Failed to remove partial output {}: {}",
                        output.display(),
                        e
                    )),
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use crate::remote::MockSiteDeployer;
    use mstudio_models::{JobId, JobKind};
    use tempfile::TempDir;

    fn site() -> DeployedSite {
        DeployedSite {
            site_name: "ms-render-1".to_string(),
            bucket_name: "b".to_string(),
            serve_url: "https://b/sites/ms-render-1/index.html".to_string(),
        }
    }

    fn logger() -> JobLogger {
        JobLogger::new(&JobId::new(), JobKind::Render)
    }

    #[tokio::test]
    async fn test_release_deletes_site_and_dir() {
        let dir = TempDir::new().unwrap();
        let resources_dir = dir.path().join("job");
        let mut resources = JobResources::new(resources_dir.clone());
        resources.create_dirs().await.unwrap();
        resources.track_site(site());

        let mut deployer = MockSiteDeployer::new();
        deployer
            .expect_delete()
            .withf(|s| s.site_name == "ms-render-1")
            .times(1)
            .returning(|_| Ok(()));

        let report = resources.release(&deployer, &logger(), true).await;
        assert!(report.site_deleted);
        assert!(report.work_dir_removed);
        assert!(!resources_dir.exists());
    }

    #[tokio::test]
    async fn test_site_delete_failure_still_removes_dir() {
        let dir = TempDir::new().unwrap();
        let mut resources = JobResources::new(dir.path().join("job"));
        resources.create_dirs().await.unwrap();
        resources.track_site(site());

        let mut deployer = MockSiteDeployer::new();
        deployer
            .expect_delete()
            .times(1)
            .returning(|_| Err(WorkerError::deploy("access denied")));

        let report = resources.release(&deployer, &logger(), false).await;
        assert!(!report.site_deleted);
        assert!(report.work_dir_removed);
    }

    #[tokio::test]
    async fn test_partial_output_removed_only_on_failure() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");

        std::fs::write(&output, b"partial").unwrap();
        let mut resources = JobResources::new(dir.path().join("job-a"));
        resources.track_output(output.clone());
        let deployer = MockSiteDeployer::new();
        let report = resources.release(&deployer, &logger(), true).await;
        assert!(!report.partial_output_removed);
        assert!(output.exists());

        let mut resources = JobResources::new(dir.path().join("job-b"));
        resources.track_output(output.clone());
        let report = resources.release(&deployer, &logger(), false).await;
        assert!(report.partial_output_removed);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_no_site_means_no_delete_call() {
        let dir = TempDir::new().unwrap();
        let resources = JobResources::new(dir.path().join("never-created"));
        // No expectations: any delete call would panic.
        let deployer = MockSiteDeployer::new();
        let report = resources.release(&deployer, &logger(), false).await;
        assert!(report.work_dir_removed);
    }
}
