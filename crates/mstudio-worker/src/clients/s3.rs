//! S3-backed provisioner, site deployer and artifact retriever.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mstudio_models::{BucketProvision, DeployedSite, OutputLocation};
use mstudio_storage::S3Client;

use crate::bundle::Bundler;
use crate::error::{WorkerError, WorkerResult};
use crate::remote::{ArtifactRetriever, ResourceProvisioner, SiteDeployer};

/// Key prefix of a deployed site.
pub fn site_prefix(site_name: &str) -> String {
    format!("sites/{}/", site_name)
}

/// First existing render bucket for `prefix` in `region`, by name.
pub fn find_render_bucket(names: &[String], prefix: &str, region: &str) -> Option<String> {
    let wanted = format!("{}-{}-", prefix, region);
    let mut matches: Vec<&String> = names.iter().filter(|n| n.starts_with(&wanted)).collect();
    matches.sort();
    matches.first().map(|n| n.to_string())
}

/// Fresh render bucket name. S3 names are capped at 63 characters.
pub fn new_bucket_name(prefix: &str, region: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(10).collect();
    let mut name = format!("{}-{}-{}", prefix, region, suffix);
    name.truncate(63);
    name
}

/// Bucket every worker should use once `created` exists.
///
/// Concurrent provisioners may each create a bucket; all of them settle on
/// the first name in `names_after` so later renders share one bucket.
/// Falls back to `created` when the listing does not show it yet.
pub fn settle_bucket(created: &str, names_after: &[String], prefix: &str, region: &str) -> String {
    find_render_bucket(names_after, prefix, region).unwrap_or_else(|| created.to_string())
}

/// Finds or creates the render bucket.
///
/// The first successful provision is cached, so concurrent jobs in this
/// process wait on one lookup instead of racing to create buckets.
#[derive(Clone)]
pub struct S3Provisioner {
    s3: S3Client,
    prefix: String,
    provisioned: Arc<OnceCell<BucketProvision>>,
}

impl S3Provisioner {
    pub fn new(s3: S3Client, prefix: impl Into<String>) -> Self {
        Self {
            s3,
            prefix: prefix.into(),
            provisioned: Arc::new(OnceCell::new()),
        }
    }

    async fn list_buckets(&self) -> WorkerResult<Vec<String>> {
        self.s3
            .list_buckets()
            .await
            .map_err(|e| WorkerError::provisioning(e.to_string()))
    }

    async fn provision(&self) -> WorkerResult<BucketProvision> {
        let region = self.s3.region().to_string();
        let names = self.list_buckets().await?;

        if let Some(bucket_name) = find_render_bucket(&names, &self.prefix, &region) {
            debug!(bucket = %bucket_name, "Using existing render bucket");
            return Ok(BucketProvision {
                bucket_name,
                region,
                already_existed: true,
            });
        }

        let created_name = new_bucket_name(&self.prefix, &region);
        let created = self
            .s3
            .create_bucket(&created_name)
            .await
            .map_err(|e| WorkerError::provisioning(e.to_string()))?;

        let names_after = self.list_buckets().await?;
        let bucket_name = settle_bucket(&created_name, &names_after, &self.prefix, &region);
        if bucket_name != created_name {
            warn!(
                bucket = %bucket_name,
                unused = %created_name,
                "Another worker provisioned a render bucket first"
            );
            return Ok(BucketProvision {
                bucket_name,
                region,
                already_existed: true,
            });
        }

        info!(bucket = %bucket_name, created, "Provisioned render bucket");
        Ok(BucketProvision {
            bucket_name,
            region,
            already_existed: !created,
        })
    }
}

#[async_trait]
impl ResourceProvisioner for S3Provisioner {
    async fn ensure_bucket(&self) -> WorkerResult<BucketProvision> {
        if let Some(cached) = self.provisioned.get() {
            return Ok(BucketProvision {
                already_existed: true,
                ..cached.clone()
            });
        }
        let provision = self
            .provisioned
            .get_or_try_init(|| self.provision())
            .await?;
        Ok(provision.clone())
    }
}

/// Bundles a scene and publishes it under `sites/{name}/`.
#[derive(Clone)]
pub struct S3SiteDeployer {
    s3: S3Client,
    bundler: Bundler,
}

impl S3SiteDeployer {
    pub fn new(s3: S3Client, bundler: Bundler) -> Self {
        Self { s3, bundler }
    }
}

#[async_trait]
impl SiteDeployer for S3SiteDeployer {
    async fn deploy(
        &self,
        bucket: &BucketProvision,
        site_name: &str,
        entry_point: &Path,
        bundle_dir: &Path,
    ) -> WorkerResult<DeployedSite> {
        self.bundler.bundle(entry_point, bundle_dir).await?;

        let prefix = site_prefix(site_name);
        let uploaded = self
            .s3
            .upload_dir(&bucket.bucket_name, bundle_dir, prefix.trim_end_matches('/'))
            .await
            .map_err(|e| WorkerError::deploy(e.to_string()))?;

        let serve_url = self
            .s3
            .object_url(&bucket.bucket_name, &format!("{}index.html", prefix));
        info!(site = %site_name, files = uploaded, url = %serve_url, "Site deployed");

        Ok(DeployedSite {
            site_name: site_name.to_string(),
            bucket_name: bucket.bucket_name.clone(),
            serve_url,
        })
    }

    async fn delete(&self, site: &DeployedSite) -> WorkerResult<()> {
        let removed = self
            .s3
            .delete_prefix(&site.bucket_name, &site_prefix(&site.site_name))
            .await
            .map_err(|e| WorkerError::deploy(format!("site deletion failed: {}", e)))?;
        debug!(site = %site.site_name, removed, "Site deleted");
        Ok(())
    }
}

/// Streams render outputs from S3.
#[derive(Clone)]
pub struct S3ArtifactRetriever {
    s3: S3Client,
}

impl S3ArtifactRetriever {
    pub fn new(s3: S3Client) -> Self {
        Self { s3 }
    }
}

#[async_trait]
impl ArtifactRetriever for S3ArtifactRetriever {
    async fn retrieve(&self, output: &OutputLocation, dest: &Path) -> WorkerResult<u64> {
        self.s3
            .download_to_file(&output.bucket, &output.key, dest)
            .await
            .map_err(|e| WorkerError::retrieval(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_render_bucket() {
        let names = vec![
            "other-bucket".to_string(),
            "mstudio-eu-west-1-aaaa".to_string(),
            "mstudio-us-east-1-zzzz".to_string(),
            "mstudio-us-east-1-bbbb".to_string(),
        ];
        assert_eq!(
            find_render_bucket(&names, "mstudio", "us-east-1").as_deref(),
            Some("mstudio-us-east-1-bbbb")
        );
        assert!(find_render_bucket(&names, "mstudio", "ap-south-1").is_none());
    }

    #[test]
    fn test_concurrent_provisioners_settle_on_one_bucket() {
        let after = vec![
            "mstudio-us-east-1-7f3a".to_string(),
            "mstudio-us-east-1-0b21".to_string(),
        ];
        for created in ["mstudio-us-east-1-7f3a", "mstudio-us-east-1-0b21"] {
            assert_eq!(
                settle_bucket(created, &after, "mstudio", "us-east-1"),
                "mstudio-us-east-1-0b21"
            );
        }
    }

    #[test]
    fn test_settle_keeps_created_bucket_missing_from_listing() {
        let after = vec!["unrelated".to_string()];
        assert_eq!(
            settle_bucket("mstudio-us-east-1-7f3a", &after, "mstudio", "us-east-1"),
            "mstudio-us-east-1-7f3a"
        );
    }

    #[test]
    fn test_new_bucket_name_shape() {
        let name = new_bucket_name("mstudio", "us-east-1");
        assert!(name.starts_with("mstudio-us-east-1-"));
        assert_eq!(name.len(), "mstudio-us-east-1-".len() + 10);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert_ne!(name, new_bucket_name("mstudio", "us-east-1"));
    }

    #[test]
    fn test_site_prefix() {
        assert_eq!(site_prefix("ms-render-1"), "sites/ms-render-1/");
    }
}
