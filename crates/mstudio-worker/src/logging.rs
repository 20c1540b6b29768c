//! Structured per-job logging.
//!
//! Every line carries the job id and kind so a single job can be followed
//! through the interleaved output of concurrent jobs.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mstudio_models::{JobId, JobKind, JobStep};

/// Logger bound to one job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: JobKind,
}

impl JobLogger {
    pub fn new(job_id: &JobId, kind: JobKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            "Job started: {}", message
        );
    }

    /// Log entry into a workflow step.
    pub fn log_step(&self, step: JobStep) {
        info!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            step = step.as_str(),
            "Job step"
        );
    }

    /// Remote render progress, logged at most once per whole percent change.
    pub fn log_render_progress(&self, percent: u8) {
        info!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            percent,
            "Render progress"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Span wrapping the whole job task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            kind = self.kind.as_str()
        )
    }
}

/// Install the global subscriber.
///
/// `LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` adds directives on
/// top of `mstudio=info`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["mstudio=info", "aws_config=warn", "aws_smithy_runtime=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}
