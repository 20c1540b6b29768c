//! Render job orchestration.
//!
//! This crate provides:
//! - Job submission with backpressure and status lookup
//! - The executor pool driving prompt and caption workflows
//! - Clients for scene generation, transcription, site hosting and remote rendering
//! - Guaranteed per-job resource release and retention sweeping

pub mod bundle;
pub mod clients;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod poll;
pub mod remote;
pub mod resources;
pub mod retry;
pub mod site;
pub mod sweeper;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use config::WorkerConfig;
pub use context::{open_job_store, Collaborators, JobContext, JobTask};
pub use error::{WorkerError, WorkerResult};
pub use executor::{job_system, JobExecutor, ShutdownHandle};
pub use logging::{init_tracing, JobLogger};
pub use orchestrator::JobOrchestrator;
pub use sweeper::spawn_sweeper;
