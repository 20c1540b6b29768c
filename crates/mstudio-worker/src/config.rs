//! Worker configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use mstudio_models::RenderLimits;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs running at once
    pub max_concurrent_jobs: usize,
    /// Maximum submitted jobs waiting for a slot
    pub queue_capacity: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Per-job scratch space, `{work_dir}/{job_id}/`
    pub work_dir: PathBuf,
    /// Finished videos, served under `/videos/`
    pub videos_dir: PathBuf,
    /// Base URL the videos directory is reachable at
    pub public_base_url: String,
    /// Delay before each render status query
    pub poll_interval: Duration,
    /// Upper bound on waiting for a remote render. `None` waits indefinitely.
    pub max_poll_wait: Option<Duration>,
    /// Remote limits for prompt renders
    pub prompt_limits: RenderLimits,
    /// Remote limits for caption renders
    pub caption_limits: RenderLimits,
    pub codec: String,
    pub caption_fps: u32,
    /// Render bucket names start with `{bucket_prefix}-{region}-`
    pub bucket_prefix: String,
    /// How long job records are kept
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub ffmpeg_timeout_secs: u64,
    /// Bundler invocation; entry point and output directory are appended
    pub bundle_command: Vec<String>,
    pub bundle_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            queue_capacity: 64,
            shutdown_timeout: Duration::from_secs(30),
            work_dir: PathBuf::from("/tmp/mstudio"),
            videos_dir: PathBuf::from("./videos"),
            public_base_url: "http://localhost:3000".to_string(),
            poll_interval: Duration::from_secs(4),
            max_poll_wait: Some(Duration::from_secs(15 * 60)),
            prompt_limits: RenderLimits {
                timeout_ms: 120_000,
                frames_per_worker: 20,
            },
            caption_limits: RenderLimits {
                timeout_ms: 240_000,
                frames_per_worker: 60,
            },
            codec: "h264".to_string(),
            caption_fps: 30,
            bucket_prefix: "mstudio".to_string(),
            retention: Duration::from_secs(2 * 60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            ffmpeg_timeout_secs: 600,
            bundle_command: default_bundle_command(),
            bundle_timeout: Duration::from_secs(300),
        }
    }
}

fn default_bundle_command() -> Vec<String> {
    ["npx", "remotion", "bundle"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_poll_wait_secs: u64 = env_or("RENDER_MAX_POLL_WAIT_SECS", 15 * 60);

        Self {
            max_concurrent_jobs: env_or("WORKER_MAX_JOBS", defaults.max_concurrent_jobs),
            queue_capacity: env_or("WORKER_QUEUE_CAPACITY", defaults.queue_capacity),
            shutdown_timeout: Duration::from_secs(env_or("WORKER_SHUTDOWN_TIMEOUT", 30)),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            videos_dir: std::env::var("VIDEOS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.videos_dir),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            poll_interval: Duration::from_millis(env_or("RENDER_POLL_INTERVAL_MS", 4_000)),
            max_poll_wait: (max_poll_wait_secs > 0).then(|| Duration::from_secs(max_poll_wait_secs)),
            prompt_limits: RenderLimits {
                timeout_ms: env_or("RENDER_TIMEOUT_MS", defaults.prompt_limits.timeout_ms),
                frames_per_worker: env_or(
                    "RENDER_FRAMES_PER_WORKER",
                    defaults.prompt_limits.frames_per_worker,
                ),
            },
            caption_limits: RenderLimits {
                timeout_ms: env_or("CAPTION_RENDER_TIMEOUT_MS", defaults.caption_limits.timeout_ms),
                frames_per_worker: env_or(
                    "CAPTION_FRAMES_PER_WORKER",
                    defaults.caption_limits.frames_per_worker,
                ),
            },
            codec: std::env::var("RENDER_CODEC").unwrap_or(defaults.codec),
            caption_fps: env_or("CAPTION_FPS", defaults.caption_fps),
            bucket_prefix: std::env::var("RENDER_BUCKET_PREFIX").unwrap_or(defaults.bucket_prefix),
            retention: Duration::from_secs(env_or("JOB_RETENTION_SECS", 2 * 60 * 60)),
            sweep_interval: Duration::from_secs(env_or("JOB_SWEEP_INTERVAL_SECS", 5 * 60)),
            ffmpeg_timeout_secs: env_or("FFMPEG_TIMEOUT_SECS", defaults.ffmpeg_timeout_secs),
            bundle_command: std::env::var("BUNDLE_COMMAND")
                .ok()
                .map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                .filter(|parts| !parts.is_empty())
                .unwrap_or(defaults.bundle_command),
            bundle_timeout: Duration::from_secs(env_or("BUNDLE_TIMEOUT_SECS", 300)),
        }
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(WorkerError::config("WORKER_MAX_JOBS must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(WorkerError::config("WORKER_QUEUE_CAPACITY must be at least 1"));
        }
        if self.caption_fps == 0 {
            return Err(WorkerError::config("CAPTION_FPS must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(WorkerError::config("RENDER_POLL_INTERVAL_MS must be positive"));
        }
        if self.bucket_prefix.is_empty()
            || !self
                .bucket_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(WorkerError::config(
                "RENDER_BUCKET_PREFIX must be lowercase letters, digits or '-'",
            ));
        }
        if self.bundle_command.is_empty() {
            return Err(WorkerError::config("BUNDLE_COMMAND must not be empty"));
        }
        Ok(())
    }

    /// Scratch directory of one job.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(job_id)
    }

    /// Local path of a finished video.
    pub fn video_path(&self, file_name: &str) -> PathBuf {
        self.videos_dir.join(file_name)
    }

    /// Public URL of a finished video.
    pub fn video_url(&self, file_name: &str) -> String {
        format!("{}/videos/{}", self.public_base_url, file_name)
    }

    /// Retention as a chrono duration for store sweeps.
    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.retention).unwrap_or_else(|_| chrono::Duration::hours(2))
    }

    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }
}
