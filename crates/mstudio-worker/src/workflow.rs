//! Job workflows.
//!
//! A prompt job generates a scene and renders it. A caption job downloads
//! the source, transcribes it and either renders a caption track remotely
//! or burns subtitles locally. Both remote paths share [`render_scene`]:
//! provision, write and deploy the site, dispatch, poll, retrieve.
//!
//! Workflows only report their outcome. The terminal transition, the
//! notification and resource release are owned by the executor.

use std::path::Path;
use std::time::Instant;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use mstudio_media::{
    build_caption_track, caption_duration_frames, group_words, to_srt, Grouping,
    CAPTIONS_COMPOSITION_FILE, CAPTIONS_COMPOSITION_SOURCE,
};
use mstudio_models::{
    CaptionMode, CaptionRequest, JobNotification, JobResult, JobStep, RenderJob, RenderLimits,
    RenderRequest, SceneCode, SceneDefinition,
};

use crate::context::{JobContext, JobTask};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::poll::{PollOutcome, PollSettings, RenderPoller};
use crate::resources::JobResources;
use crate::site::write_site;

/// Composition id of the caption template.
pub const CAPTIONS_COMPOSITION_ID: &str = "CaptionsVideo";

const RENDER_SITE_PREFIX: &str = "ms-render";
const CAPTIONS_SITE_PREFIX: &str = "ms-captions";

/// A job record being driven through its workflow.
pub struct JobRun<'a> {
    ctx: &'a JobContext,
    job: RenderJob,
    logger: JobLogger,
    started: Instant,
}

impl<'a> JobRun<'a> {
    pub fn new(ctx: &'a JobContext, job: RenderJob) -> Self {
        let logger = JobLogger::new(&job.id, job.kind);
        Self {
            ctx,
            job,
            logger,
            started: Instant::now(),
        }
    }

    pub fn job(&self) -> &RenderJob {
        &self.job
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    async fn step(&mut self, step: JobStep) {
        self.logger.log_step(step);
        self.job.set_step(step);
        self.persist().await;
    }

    async fn progress(&mut self, percent: u8) {
        self.logger.log_render_progress(percent);
        self.job.set_progress(percent);
        self.persist().await;
    }

    /// Write the record back. A record that has been evicted stays evicted.
    async fn persist(&self) -> bool {
        match self.ctx.store.update(&self.job).await {
            Ok(true) => true,
            Ok(false) => {
                self.logger
                    .log_warning("Job record no longer exists, update skipped");
                false
            }
            Err(e) => {
                self.logger
                    .log_warning(&format!("Failed to persist job record: {}", e));
                false
            }
        }
    }

    /// Apply the single terminal transition, persist it and notify.
    pub async fn finish(mut self, outcome: WorkerResult<JobResult>) {
        let transition = match outcome {
            Ok(result) => {
                self.logger.log_completion(&format!(
                    "url={}",
                    result.url.as_deref().unwrap_or("none")
                ));
                self.job.complete(result)
            }
            Err(e) => {
                self.logger.log_error(&e.to_string());
                self.job.fail(e.job_message())
            }
        };

        if let Err(e) = transition {
            self.logger.log_error(&format!("Terminal transition rejected: {}", e));
            return;
        }

        self.persist().await;
        metrics::record_job_finished(
            self.job.kind,
            self.job.status,
            self.started.elapsed().as_secs_f64(),
        );

        if let Some(notification) = JobNotification::from_job(&self.job) {
            if let Err(e) = self.ctx.collaborators.notifier.notify(&notification).await {
                self.logger
                    .log_warning(&format!("Notification failed: {}", e));
            }
        }
    }
}

/// Run the workflow for `task`.
pub async fn run_task(
    run: &mut JobRun<'_>,
    task: &JobTask,
    resources: &mut JobResources,
) -> WorkerResult<JobResult> {
    match task {
        JobTask::Render { prompt, .. } => {
            run.logger.log_start("prompt render");
            run_render(run, prompt, resources).await
        }
        JobTask::Captions { request, .. } => {
            run.logger.log_start(&format!("captions for {}", request.video_url));
            run_captions(run, request, resources).await
        }
    }
}

async fn run_render(
    run: &mut JobRun<'_>,
    prompt: &str,
    resources: &mut JobResources,
) -> WorkerResult<JobResult> {
    let ctx = run.ctx;

    run.step(JobStep::GeneratingScene).await;
    let scene = ctx.collaborators.scenes.describe(prompt).await?;
    scene.validate()?;

    let file_name = format!("{}.mp4", run.job.id);
    render_scene(
        run,
        &scene,
        RENDER_SITE_PREFIX,
        ctx.config.prompt_limits,
        resources,
        &ctx.config.video_path(&file_name),
    )
    .await?;

    Ok(JobResult {
        url: Some(ctx.config.video_url(&file_name)),
        title: scene.title.clone(),
        duration_seconds: JobResult::duration_from_frames(scene.duration_in_frames, scene.fps),
        fps: scene.fps,
        words: None,
    })
}

async fn run_captions(
    run: &mut JobRun<'_>,
    request: &CaptionRequest,
    resources: &mut JobResources,
) -> WorkerResult<JobResult> {
    let ctx = run.ctx;
    let media = &ctx.collaborators.media;
    let fps = ctx.config.caption_fps;

    resources.create_dirs().await?;
    let source = resources.media_dir().join("source.mp4");
    let audio = resources.media_dir().join("audio.wav");

    run.step(JobStep::DownloadingSource).await;
    media.fetch_source(&request.video_url, &source).await?;

    run.step(JobStep::ExtractingAudio).await;
    media.extract_audio(&source, &audio).await?;

    run.step(JobStep::Transcribing).await;
    let words = ctx.collaborators.transcriber.transcribe(&audio).await?;

    let title = format!("Captions - {}", request.style);
    if words.is_empty() {
        run.logger.log_warning("Transcription found no words, nothing to render");
        return Ok(JobResult {
            url: None,
            title,
            duration_seconds: 0.0,
            fps,
            words: Some(words),
        });
    }

    let style = ctx
        .styles
        .resolve(&request.style)
        .ok_or_else(|| WorkerError::config("no caption styles are registered"))?;
    if !ctx.styles.contains(&request.style) {
        run.logger.log_warning(&format!(
            "Unknown caption style '{}', using '{}'",
            request.style, style.id
        ));
    }

    let duration_in_frames = caption_duration_frames(&words, fps);
    let file_name = format!("{}-captioned.mp4", run.job.id);
    let output = ctx.config.video_path(&file_name);

    match request.mode {
        CaptionMode::Remote => {
            let dimensions = media.probe_dimensions(&source).await;
            let track =
                build_caption_track(style, &words, fps, duration_in_frames, &request.emoji_cues);

            let scene = SceneDefinition {
                code: SceneCode::Template {
                    file_name: CAPTIONS_COMPOSITION_FILE.to_string(),
                    source: CAPTIONS_COMPOSITION_SOURCE.to_string(),
                },
                composition_id: CAPTIONS_COMPOSITION_ID.to_string(),
                duration_in_frames,
                fps,
                width: dimensions.width,
                height: dimensions.height,
                title: title.clone(),
                input_props: json!({
                    "videoUrl": request.video_url,
                    "track": track,
                }),
            };

            render_scene(
                run,
                &scene,
                CAPTIONS_SITE_PREFIX,
                ctx.config.caption_limits,
                resources,
                &output,
            )
            .await?;
        }
        CaptionMode::Burn => {
            run.step(JobStep::BurningSubtitles).await;

            let group_size = match style.grouping {
                Grouping::Group(size) => size,
                Grouping::SingleWord => 1,
            };
            let subtitles = resources.media_dir().join("captions.srt");
            tokio::fs::write(&subtitles, to_srt(&group_words(&words, group_size))).await?;

            tokio::fs::create_dir_all(ctx.config.videos_dir()).await?;
            resources.track_output(output.clone());
            media.burn_subtitles(&source, &subtitles, &output).await?;
        }
    }

    Ok(JobResult {
        url: Some(ctx.config.video_url(&file_name)),
        title,
        duration_seconds: JobResult::duration_from_frames(duration_in_frames, fps),
        fps,
        words: Some(words),
    })
}

/// Provision, deploy, dispatch, poll and retrieve `scene` into `output`.
async fn render_scene(
    run: &mut JobRun<'_>,
    scene: &SceneDefinition,
    site_prefix: &str,
    limits: RenderLimits,
    resources: &mut JobResources,
    output: &Path,
) -> WorkerResult<()> {
    let ctx = run.ctx;
    let remote = &ctx.collaborators;

    scene.validate()?;
    resources.create_dirs().await?;

    run.step(JobStep::Provisioning).await;
    let bucket = remote.provisioner.ensure_bucket().await?;
    if !bucket.already_existed {
        info!(job_id = %run.job.id, bucket = %bucket.bucket_name, "Created render bucket");
    }

    run.step(JobStep::DeployingSite).await;
    let entry_point = write_site(&resources.scene_dir(), scene).await?;
    let site_name = format!("{}-{}", site_prefix, Uuid::new_v4());
    // Tracked before deploying so a half-finished upload is still removed.
    resources.track_pending_site(&site_name, &bucket.bucket_name);
    let site = remote
        .deployer
        .deploy(&bucket, &site_name, &entry_point, &resources.bundle_dir())
        .await?;
    resources.track_site(site.clone());

    run.step(JobStep::Rendering).await;
    let request = RenderRequest {
        serve_url: site.serve_url.clone(),
        composition: scene.composition_id.clone(),
        input_props: scene.input_props.clone(),
        codec: ctx.config.codec.clone(),
        limits,
    };
    let handle = remote.dispatcher.start(&bucket.bucket_name, &request).await?;

    let settings = PollSettings {
        interval: ctx.config.poll_interval,
        max_wait: ctx.config.max_poll_wait,
    };
    let mut poller = RenderPoller::new(remote.dispatcher.as_ref(), &handle, settings);
    let location = loop {
        match poller.next().await? {
            PollOutcome::Finished(location) => break location,
            PollOutcome::Progressed(percent) => run.progress(percent).await,
            PollOutcome::Pending => {}
        }
    };

    run.step(JobStep::DownloadingArtifact).await;
    tokio::fs::create_dir_all(ctx.config.videos_dir()).await?;
    resources.track_output(output.to_path_buf());
    let bytes = remote.retriever.retrieve(&location, output).await?;
    if bytes == 0 {
        return Err(WorkerError::retrieval(format!(
            "{}/{} is empty",
            location.bucket, location.key
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MockArtifactRetriever, MockSiteDeployer, MockTranscriber};
    use crate::test_support::{test_config, Calls, Harness};
    use mstudio_models::{JobId, JobKind, JobStatus};
    use tempfile::TempDir;

    fn captions(mode: CaptionMode) -> JobTask {
        JobTask::Captions {
            job_id: JobId::from_string("job-1"),
            request: CaptionRequest {
                video_url: "https://cdn.example.com/talk.mp4".to_string(),
                style: "no-such-style".to_string(),
                mode,
                emoji_cues: Vec::new(),
            },
        }
    }

    async fn run_one(
        ctx: &JobContext,
        task: &JobTask,
    ) -> (WorkerResult<JobResult>, JobResources) {
        let job = RenderJob::new(task.job_id().clone(), task.kind());
        ctx.store.insert(job.clone()).await.unwrap();
        let mut run = JobRun::new(ctx, job);
        let mut resources = JobResources::new(ctx.config.job_dir(task.job_id().as_str()));
        let outcome = run_task(&mut run, task, &mut resources).await;
        (outcome, resources)
    }

    #[tokio::test]
    async fn test_empty_transcription_finishes_without_render() {
        let dir = TempDir::new().unwrap();
        let mut harness = Harness::happy();
        harness.transcriber = MockTranscriber::new();
        harness.transcriber.expect_transcribe().returning(|_| Ok(Vec::new()));
        let (ctx, calls) = harness.build(test_config(dir.path()));

        let (outcome, resources) = run_one(&ctx, &captions(CaptionMode::Remote)).await;
        let result = outcome.unwrap();

        assert!(result.url.is_none());
        assert_eq!(result.words, Some(Vec::new()));
        assert_eq!(result.duration_seconds, 0.0);
        assert!(resources.site().is_none());
        assert_eq!(Calls::count(&calls.deploys), 0);
        assert_eq!(Calls::count(&calls.starts), 0);
    }

    #[tokio::test]
    async fn test_burn_mode_writes_subtitles_locally() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let output = config.video_path("job-1-captioned.mp4");
        let (ctx, calls) = Harness::happy().build(config);

        let (outcome, resources) = run_one(&ctx, &captions(CaptionMode::Burn)).await;
        let result = outcome.unwrap();

        assert_eq!(
            result.url.as_deref(),
            Some("http://localhost:3000/videos/job-1-captioned.mp4")
        );
        assert!(output.exists());
        let srt = std::fs::read_to_string(resources.media_dir().join("captions.srt")).unwrap();
        assert!(srt.starts_with("1\n00:00:00,000 --> "));
        assert_eq!(Calls::count(&calls.deploys), 0);
    }

    #[tokio::test]
    async fn test_unknown_style_falls_back() {
        let dir = TempDir::new().unwrap();
        let (ctx, calls) = Harness::happy().build(test_config(dir.path()));

        let (outcome, _) = run_one(&ctx, &captions(CaptionMode::Remote)).await;
        assert!(outcome.is_ok());

        let requests = calls.render_requests.lock().unwrap();
        let track = &requests[0].input_props["track"];
        assert!(track.is_object());
    }

    #[tokio::test]
    async fn test_failed_deploy_still_tracks_site() {
        let dir = TempDir::new().unwrap();
        let mut harness = Harness::happy();
        harness.deployer = MockSiteDeployer::new();
        harness
            .deployer
            .expect_deploy()
            .returning(|_, _, _, _| Err(WorkerError::deploy("upload interrupted")));
        let (ctx, _) = harness.build(test_config(dir.path()));

        let task = JobTask::Render {
            job_id: JobId::from_string("job-2"),
            prompt: "a sunrise".to_string(),
        };
        let (outcome, resources) = run_one(&ctx, &task).await;

        assert!(matches!(outcome, Err(WorkerError::Deploy(_))));
        let site = resources.site().unwrap();
        assert!(site.site_name.starts_with("ms-render-"));
        assert!(site.serve_url.is_empty());
    }

    #[tokio::test]
    async fn test_empty_artifact_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut harness = Harness::happy();
        harness.retriever = MockArtifactRetriever::new();
        harness.retriever.expect_retrieve().returning(|_, _| Ok(0));
        let (ctx, _) = harness.build(test_config(dir.path()));

        let task = JobTask::Render {
            job_id: JobId::from_string("job-3"),
            prompt: "a sunrise".to_string(),
        };
        let (outcome, _) = run_one(&ctx, &task).await;
        assert!(matches!(outcome, Err(WorkerError::Retrieval(_))));
    }

    #[tokio::test]
    async fn test_progress_is_persisted_while_polling() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = Harness::happy().build(test_config(dir.path()));
        let task = JobTask::Render {
            job_id: JobId::from_string("job-4"),
            prompt: "a sunrise".to_string(),
        };

        let (outcome, _) = run_one(&ctx, &task).await;
        assert!(outcome.is_ok());

        let stored = ctx.store.get(task.job_id()).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert_eq!(stored.step, JobStep::DownloadingArtifact);
        assert_eq!(stored.progress, 50);
    }

    #[tokio::test]
    async fn test_finish_notifies_once_even_if_record_was_swept() {
        let dir = TempDir::new().unwrap();
        let (ctx, calls) = Harness::happy().build(test_config(dir.path()));
        let job = RenderJob::new(JobId::from_string("job-5"), JobKind::Render);

        let run = JobRun::new(&ctx, job);
        run.finish(Err(WorkerError::render("boom"))).await;

        let sent = calls.notifications.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, JobStatus::Error);
        assert!(ctx.store.get(&JobId::from_string("job-5")).await.unwrap().is_none());
    }
}
