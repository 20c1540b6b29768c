//! S3 client implementation.

use std::path::{Path, PathBuf};

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Maximum keys per DeleteObjects request.
const DELETE_BATCH_SIZE: usize = 1000;

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    /// Static credentials; the default AWS provider chain is used when absent
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Custom endpoint (MinIO, LocalStack)
    pub endpoint_url: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
        }
    }
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let access_key_id = std::env::var("MSTUDIO_AWS_ACCESS_KEY_ID").ok();
        let secret_access_key = std::env::var("MSTUDIO_AWS_SECRET_ACCESS_KEY").ok();

        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::config_error(
                "MSTUDIO_AWS_ACCESS_KEY_ID and MSTUDIO_AWS_SECRET_ACCESS_KEY must be set together",
            ));
        }

        let region = std::env::var("MSTUDIO_AWS_REGION")
            .or_else(|_| std::env::var("AWS_REGION"))
            .unwrap_or_else(|_| "us-east-1".to_string());
        if region.trim().is_empty() {
            return Err(StorageError::config_error("AWS region must not be empty"));
        }

        Ok(Self {
            region,
            access_key_id,
            secret_access_key,
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
        })
    }
}

/// S3 storage client. Operations take the bucket explicitly because the
/// working bucket is discovered or created at runtime.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    region: String,
    endpoint_url: Option<String>,
}

impl S3Client {
    /// Create a new client from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(id, secret, None, None, "mstudio"));
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region: config.region,
            endpoint_url: config.endpoint_url,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(S3Config::from_env()?).await
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Public URL of an object.
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        object_url(self.endpoint_url.as_deref(), &self.region, bucket, key)
    }

    /// Names of every bucket visible to the credentials.
    pub async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| StorageError::ListFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    /// Create a bucket in the client's region.
    ///
    /// Returns `false` when the bucket already exists and is owned by us.
    pub async fn create_bucket(&self, bucket: &str) -> StorageResult<bool> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(bucket, region = %self.region, "Created bucket");
                Ok(true)
            }
            Err(e)
                if e
                    .as_service_error()
                    .map(|se| se.is_bucket_already_owned_by_you())
                    .unwrap_or(false) =>
            {
                debug!(bucket, "Bucket already owned by us");
                Ok(false)
            }
            Err(e) => Err(StorageError::bucket_failed(format!(
                "create {}: {}",
                bucket,
                DisplayErrorContext(&e)
            ))),
        }
    }

    /// Upload a file.
    pub async fn upload_file(
        &self,
        bucket: &str,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to s3://{}/{}", path.display(), bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    /// Upload every file under `dir` to `prefix`, keeping relative paths.
    ///
    /// Returns the number of uploaded files.
    pub async fn upload_dir(&self, bucket: &str, dir: &Path, prefix: &str) -> StorageResult<usize> {
        let files = collect_files(dir).await?;
        if files.is_empty() {
            return Err(StorageError::upload_failed(format!(
                "{} contains no files",
                dir.display()
            )));
        }

        for file in &files {
            let relative = file
                .strip_prefix(dir)
                .map_err(|e| StorageError::upload_failed(e.to_string()))?;
            let key = join_key(prefix, &relative.to_string_lossy().replace('\\', "/"));
            self.upload_file(bucket, file, &key, content_type_for(file))
                .await?;
        }

        info!(bucket, prefix, files = files.len(), "Uploaded directory");
        Ok(files.len())
    }

    /// List objects with a prefix.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        debug!("Listing s3://{}/{}", bucket, prefix);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::ListFailed(DisplayErrorContext(&e).to_string()))?;

            for obj in response.contents() {
                objects.push(ObjectInfo {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                });
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    /// Delete objects in batches.
    pub async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<usize> {
        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            let objects = chunk
                .iter()
                .map(|k| ObjectIdentifier::builder().key(k).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::delete_failed(e.to_string()))?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| StorageError::delete_failed(e.to_string()))?;

            let response = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| StorageError::delete_failed(DisplayErrorContext(&e).to_string()))?;

            if let Some(err) = response.errors().first() {
                return Err(StorageError::delete_failed(format!(
                    "{}: {}",
                    err.key().unwrap_or_default(),
                    err.message().unwrap_or("unknown error")
                )));
            }
        }

        Ok(keys.len())
    }

    /// Delete everything under `prefix`. Returns the number of deleted objects.
    pub async fn delete_prefix(&self, bucket: &str, prefix: &str) -> StorageResult<usize> {
        if prefix.is_empty() {
            return Err(StorageError::delete_failed("refusing to delete an empty prefix"));
        }

        let keys: Vec<String> = self
            .list_objects(bucket, prefix)
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect();

        let deleted = self.delete_objects(bucket, &keys).await?;
        info!(bucket, prefix, deleted, "Deleted prefix");
        Ok(deleted)
    }

    /// Stream an object to a local file. Returns the byte count.
    pub async fn download_to_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<u64> {
        debug!("Downloading s3://{}/{} to {}", bucket, key, path.display());

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    StorageError::not_found(format!("s3://{}/{}", bucket, key))
                } else {
                    StorageError::download_failed(DisplayErrorContext(&e).to_string())
                }
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut reader = response.body.into_async_read();
        let mut file = tokio::fs::File::create(path).await?;
        let written = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(path).await;
                return Err(StorageError::download_failed(e.to_string()));
            }
        };

        info!("Downloaded s3://{}/{} ({} bytes)", bucket, key, written);
        Ok(written)
    }

    /// Check credentials and connectivity.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .list_buckets()
            .send()
            .await
            .map_err(|e| {
                StorageError::AwsSdk(format!(
                    "S3 connectivity check failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}

/// Information about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    /// Size in bytes
    pub size: u64,
}

fn object_url(endpoint: Option<&str>, region: &str, bucket: &str, key: &str) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

fn join_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative.trim_start_matches('/'))
    }
}

/// Content type guessed from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("html") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") | Some("map") => "application/json",
        Some("css") => "text/css",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("woff2") => "font/woff2",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("wav") => "audio/wav",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// All regular files below `root`, sorted for deterministic uploads.
async fn collect_files(root: &Path) -> StorageResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}
