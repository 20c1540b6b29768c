//! Job metrics.
//!
//! Recorded through the `metrics` facade; the hosting binary decides
//! whether a Prometheus recorder is installed.

use metrics::{counter, gauge, histogram};

use mstudio_models::{JobKind, JobStatus};

pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "mstudio_jobs_submitted_total";
    pub const JOBS_REJECTED_TOTAL: &str = "mstudio_jobs_rejected_total";
    pub const JOBS_FINISHED_TOTAL: &str = "mstudio_jobs_finished_total";
    pub const JOB_DURATION_SECONDS: &str = "mstudio_job_duration_seconds";
    pub const JOBS_IN_FLIGHT: &str = "mstudio_jobs_in_flight";
    pub const RENDER_POLLS_TOTAL: &str = "mstudio_render_polls_total";
    pub const CLEANUP_FAILURES_TOTAL: &str = "mstudio_cleanup_failures_total";
    pub const JOBS_SWEPT_TOTAL: &str = "mstudio_jobs_swept_total";
}

pub fn record_job_submitted(kind: JobKind) {
    counter!(names::JOBS_SUBMITTED_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Submission refused, `reason` is "busy" or "invalid".
pub fn record_job_rejected(kind: JobKind, reason: &'static str) {
    counter!(names::JOBS_REJECTED_TOTAL, "kind" => kind.as_str(), "reason" => reason).increment(1);
}

pub fn record_job_finished(kind: JobKind, status: JobStatus, duration_secs: f64) {
    let labels = [
        ("kind", kind.as_str().to_string()),
        ("status", status.as_str().to_string()),
    ];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

pub fn record_render_poll() {
    counter!(names::RENDER_POLLS_TOTAL).increment(1);
}

/// `resource` is "site" or "work_dir".
pub fn record_cleanup_failure(resource: &'static str) {
    counter!(names::CLEANUP_FAILURES_TOTAL, "resource" => resource).increment(1);
}

pub fn record_jobs_swept(count: usize) {
    counter!(names::JOBS_SWEPT_TOTAL).increment(count as u64);
}
