//! Job executor.
//!
//! Pulls tasks off the queue and runs at most `max_concurrent_jobs` of
//! them at a time. Every started job ends with exactly one terminal
//! transition followed by resource release, whatever the workflow did.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn, Instrument};

use mstudio_media::StyleRegistry;
use mstudio_models::{JobId, RenderJob};
use mstudio_queue::{task_queue, JobStore, QueueError, QueueResult, TaskReceiver};

use crate::config::WorkerConfig;
use crate::context::{Collaborators, JobContext, JobTask};
use crate::error::WorkerError;
use crate::metrics;
use crate::orchestrator::JobOrchestrator;
use crate::resources::JobResources;
use crate::retry::{retry_async, RetryConfig};
use crate::workflow::{run_task, JobRun};

/// Extra attempts at reading a job record before the job is failed.
const LOAD_RETRIES: u32 = 2;

/// Wire an orchestrator and the executor that drains its queue.
pub fn job_system(
    config: WorkerConfig,
    store: Arc<dyn JobStore>,
    styles: Arc<StyleRegistry>,
    collaborators: Collaborators,
) -> (JobOrchestrator, JobExecutor) {
    let (tx, rx) = task_queue(config.queue_capacity);
    let orchestrator = JobOrchestrator::new(store.clone(), tx);
    let ctx = JobContext {
        config: Arc::new(config),
        store,
        styles,
        collaborators,
    };
    (orchestrator, JobExecutor::new(Arc::new(ctx), rx))
}

/// Signals a running executor to stop.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.0.subscribe()
    }
}

pub struct JobExecutor {
    ctx: Arc<JobContext>,
    receiver: TaskReceiver<JobTask>,
    job_semaphore: Arc<Semaphore>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl JobExecutor {
    pub fn new(ctx: Arc<JobContext>, receiver: TaskReceiver<JobTask>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs.max(1)));
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx,
            receiver,
            job_semaphore,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    pub fn context(&self) -> &Arc<JobContext> {
        &self.ctx
    }

    fn max_jobs(&self) -> usize {
        self.ctx.config.max_concurrent_jobs.max(1)
    }

    /// Run until shutdown is signalled or every submitter is gone.
    pub async fn run(mut self) {
        let max_jobs = self.max_jobs();
        info!("Starting job executor with {} max concurrent jobs", max_jobs);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            // A slot first, then a task: queued tasks stay queued while every slot is busy.
            let permit = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
                permit = self.job_semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let task = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
                task = self.receiver.recv() => match task {
                    Some(task) => task,
                    None => {
                        info!("Task queue closed, stopping executor");
                        break;
                    }
                },
            };

            metrics::set_jobs_in_flight(max_jobs - self.job_semaphore.available_permits());

            let ctx = Arc::clone(&self.ctx);
            let semaphore = Arc::clone(&self.job_semaphore);
            tokio::spawn(async move {
                Self::execute_job(ctx, task).await;
                drop(permit);
                metrics::set_jobs_in_flight(max_jobs - semaphore.available_permits());
            });
        }

        self.receiver.close();
        let mut abandoned = 0;
        while let Some(task) = self.receiver.try_recv() {
            Self::fail_unstarted(&self.ctx, task).await;
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!("Failed {} queued jobs that never started", abandoned);
        }

        info!("Waiting for in-flight jobs to complete...");
        let timeout = self.ctx.config.shutdown_timeout;
        if tokio::time::timeout(timeout, self.wait_for_jobs()).await.is_err() {
            warn!(
                "{} jobs still running after {:?}",
                max_jobs - self.job_semaphore.available_permits(),
                timeout
            );
        }

        info!("Job executor stopped");
    }

    async fn execute_job(ctx: Arc<JobContext>, task: JobTask) {
        let job_id = task.job_id().clone();

        let job = match load_job(&ctx, &job_id).await {
            Ok(Some(job)) if !job.is_terminal() => job,
            Ok(Some(_)) => {
                warn!(job_id = %job_id, "Job already finished, skipping task");
                return;
            }
            Ok(None) => {
                warn!(job_id = %job_id, "Job record missing, skipping task");
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, "Failed to load job record: {}", e);
                // The stored record cannot be read; overwrite it with a failed one.
                JobRun::new(&ctx, RenderJob::new(job_id, task.kind()))
                    .finish(Err(WorkerError::Queue(e)))
                    .await;
                return;
            }
        };

        let mut run = JobRun::new(&ctx, job);
        let logger = run.logger().clone();
        let span = logger.create_span();
        let mut resources = JobResources::new(ctx.config.job_dir(job_id.as_str()));

        async {
            let outcome = AssertUnwindSafe(run_task(&mut run, &task, &mut resources))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(WorkerError::JobPanicked(panic_message(panic))));
            let succeeded = outcome.is_ok();

            run.finish(outcome).await;
            resources
                .release(ctx.collaborators.deployer.as_ref(), &logger, succeeded)
                .await;
        }
        .instrument(span)
        .await;
    }

    async fn fail_unstarted(ctx: &JobContext, task: JobTask) {
        let job = match load_job(ctx, task.job_id()).await {
            Ok(Some(job)) if !job.is_terminal() => job,
            Ok(_) => return,
            Err(e) => {
                error!(job_id = %task.job_id(), "Failed to load job record: {}", e);
                RenderJob::new(task.job_id().clone(), task.kind())
            }
        };
        JobRun::new(ctx, job)
            .finish(Err(WorkerError::ShuttingDown))
            .await;
    }

    async fn wait_for_jobs(&self) {
        let max_jobs = self.max_jobs();
        while self.job_semaphore.available_permits() < max_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Read a job record, retrying transient store failures.
async fn load_job(ctx: &JobContext, job_id: &JobId) -> QueueResult<Option<RenderJob>> {
    let retry = RetryConfig::new("load job record")
        .with_max_retries(LOAD_RETRIES)
        .with_base_delay(Duration::from_millis(50));
    retry_async(&retry, |_: &QueueError| true, || ctx.store.get(job_id)).await
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    // Errors only once the sender is dropped, which the executor never does while running.
    let _ = rx.wait_for(|stop| *stop).await;
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
