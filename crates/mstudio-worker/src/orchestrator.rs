//! Job submission and status lookup.
//!
//! Submission validates the request, claims a queue slot, records the job
//! and only then commits the task. A full queue is reported before any
//! record exists.

use std::sync::Arc;

use tracing::info;

use mstudio_models::{CaptionRequest, GenerateRequest, JobId, JobKind, RenderJob};
use mstudio_queue::{JobStore, TaskSender};

use crate::context::JobTask;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    queue: TaskSender<JobTask>,
}

impl JobOrchestrator {
    pub fn new(store: Arc<dyn JobStore>, queue: TaskSender<JobTask>) -> Self {
        Self { store, queue }
    }

    /// Accept a prompt render. Returns the id to poll.
    pub async fn submit_prompt(&self, request: &GenerateRequest) -> WorkerResult<JobId> {
        let prompt = request.validate().map_err(|e| {
            metrics::record_job_rejected(JobKind::Render, "invalid");
            e
        })?;

        let job_id = JobId::new();
        self.enqueue(
            JobKind::Render,
            JobTask::Render {
                job_id: job_id.clone(),
                prompt,
            },
        )
        .await?;
        Ok(job_id)
    }

    /// Accept a caption job for a hosted video.
    pub async fn submit_captions(&self, request: CaptionRequest) -> WorkerResult<JobId> {
        request.validate().map_err(|e| {
            metrics::record_job_rejected(JobKind::Captions, "invalid");
            e
        })?;

        let job_id = JobId::new();
        self.enqueue(
            JobKind::Captions,
            JobTask::Captions {
                job_id: job_id.clone(),
                request,
            },
        )
        .await?;
        Ok(job_id)
    }

    async fn enqueue(&self, kind: JobKind, task: JobTask) -> WorkerResult<()> {
        let reservation = self.queue.try_reserve().map_err(|e| {
            if e.is_busy() {
                metrics::record_job_rejected(kind, "busy");
            }
            WorkerError::from(e)
        })?;

        let job_id = task.job_id().clone();
        // Dropping the reservation on error gives the slot back.
        self.store.insert(RenderJob::new(job_id.clone(), kind)).await?;
        reservation.send(task);

        metrics::record_job_submitted(kind);
        info!(job_id = %job_id, kind = kind.as_str(), "Job queued");
        Ok(())
    }

    pub async fn status(&self, job_id: &JobId) -> WorkerResult<RenderJob> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| WorkerError::NotFound(job_id.to_string()))
    }

    /// Free queue slots right now.
    pub fn queue_headroom(&self) -> usize {
        self.queue.capacity().saturating_sub(self.queue.pending())
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstudio_models::{CaptionMode, JobStatus};
    use mstudio_queue::{task_queue, InMemoryJobStore};

    fn orchestrator(capacity: usize) -> (JobOrchestrator, mstudio_queue::TaskReceiver<JobTask>) {
        let (tx, rx) = task_queue(capacity);
        (JobOrchestrator::new(Arc::new(InMemoryJobStore::new()), tx), rx)
    }

    fn prompt(text: &str) -> GenerateRequest {
        GenerateRequest {
            prompt: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_prompt_records_and_queues() {
        let (orchestrator, mut rx) = orchestrator(4);

        let job_id = orchestrator
            .submit_prompt(&prompt("  a sunrise over the sea  "))
            .await
            .unwrap();

        let job = orchestrator.status(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.kind, JobKind::Render);

        match rx.recv().await.unwrap() {
            JobTask::Render { job_id: id, prompt } => {
                assert_eq!(id, job_id);
                assert_eq!(prompt, "a sunrise over the sea");
            }
            other => panic!("unexpected task {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_prompt_is_rejected() {
        let (orchestrator, _rx) = orchestrator(4);
        let err = orchestrator.submit_prompt(&prompt("   ")).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(orchestrator.store().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_leaves_no_record() {
        let (orchestrator, _rx) = orchestrator(1);
        orchestrator.submit_prompt(&prompt("first")).await.unwrap();
        assert_eq!(orchestrator.queue_headroom(), 0);

        let err = orchestrator.submit_prompt(&prompt("second")).await.unwrap_err();
        assert!(err.is_busy());
        assert_eq!(orchestrator.store().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submit_captions() {
        let (orchestrator, mut rx) = orchestrator(2);
        let request = CaptionRequest {
            video_url: "https://cdn.example.com/talk.mp4".to_string(),
            style: "heat".to_string(),
            mode: CaptionMode::Burn,
            emoji_cues: Vec::new(),
        };

        let job_id = orchestrator.submit_captions(request).await.unwrap();
        assert_eq!(
            orchestrator.status(&job_id).await.unwrap().kind,
            JobKind::Captions
        );
        assert!(matches!(rx.recv().await, Some(JobTask::Captions { .. })));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (orchestrator, _rx) = orchestrator(1);
        let err = orchestrator
            .status(&JobId::from_string("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::NotFound(_)));
    }
}
