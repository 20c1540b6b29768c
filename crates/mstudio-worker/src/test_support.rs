//! Mock-backed job contexts for workflow and executor tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mstudio_media::{MockMediaToolkit, StyleRegistry, VideoDimensions};
use mstudio_models::{
    BucketProvision, DeployedSite, JobNotification, OutputLocation, RenderHandle, RenderProgress,
    RenderRequest, SceneCode, SceneDefinition, TimestampedWord,
};
use mstudio_queue::{InMemoryJobStore, JobStore};

use crate::config::WorkerConfig;
use crate::context::{Collaborators, JobContext};
use crate::remote::{
    MockArtifactRetriever, MockNotifier, MockRenderDispatcher, MockResourceProvisioner,
    MockSceneDescriber, MockSiteDeployer, MockTranscriber,
};

pub const BUCKET: &str = "mstudio-us-east-1-abc123";

pub fn test_config(root: &Path) -> WorkerConfig {
    WorkerConfig {
        max_concurrent_jobs: 2,
        queue_capacity: 4,
        shutdown_timeout: Duration::from_secs(5),
        work_dir: root.join("work"),
        videos_dir: root.join("videos"),
        poll_interval: Duration::from_millis(1),
        max_poll_wait: Some(Duration::from_secs(5)),
        ..WorkerConfig::default()
    }
}

pub fn sample_scene() -> SceneDefinition {
    SceneDefinition {
        code: SceneCode::Component {
            source: "export const MainComposition = () => null;".to_string(),
        },
        composition_id: "MainVideo".to_string(),
        duration_in_frames: 150,
        fps: 30,
        width: 1280,
        height: 720,
        title: "Sunrise".to_string(),
        input_props: serde_json::json!({}),
    }
}

pub fn five_words() -> Vec<TimestampedWord> {
    vec![
        TimestampedWord::new("Hello", 0.0, 0.4),
        TimestampedWord::new("there", 0.4, 0.8),
        TimestampedWord::new("this", 0.9, 1.1),
        TimestampedWord::new("is", 1.1, 1.3),
        TimestampedWord::new("captions", 1.3, 2.0),
    ]
}

fn running(progress: f64) -> RenderProgress {
    RenderProgress {
        overall_progress: progress,
        done: false,
        fatal_error: None,
        output: None,
    }
}

fn finished() -> RenderProgress {
    RenderProgress {
        overall_progress: 1.0,
        done: true,
        fatal_error: None,
        output: Some(OutputLocation {
            bucket: BUCKET.to_string(),
            key: "renders/r-1/out.mp4".to_string(),
        }),
    }
}

/// Call counters observed after a run.
#[derive(Default)]
pub struct Calls {
    pub deploys: AtomicUsize,
    pub deletes: AtomicUsize,
    pub starts: AtomicUsize,
    pub retrieves: AtomicUsize,
    pub notifications: Mutex<Vec<JobNotification>>,
    pub render_requests: Mutex<Vec<RenderRequest>>,
}

impl Calls {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Mocks for every collaborator. Tests override single fields before building.
pub struct Harness {
    pub scenes: MockSceneDescriber,
    pub transcriber: MockTranscriber,
    pub provisioner: MockResourceProvisioner,
    pub deployer: MockSiteDeployer,
    pub dispatcher: MockRenderDispatcher,
    pub retriever: MockArtifactRetriever,
    pub notifier: MockNotifier,
    pub media: MockMediaToolkit,
    pub calls: Arc<Calls>,
}

impl Harness {
    /// Every collaborator succeeds: the render reports 50% once, then finishes.
    pub fn happy() -> Self {
        let calls = Arc::new(Calls::default());

        let mut scenes = MockSceneDescriber::new();
        scenes.expect_describe().returning(|_| Ok(sample_scene()));

        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().returning(|_| Ok(five_words()));

        let mut provisioner = MockResourceProvisioner::new();
        provisioner.expect_ensure_bucket().returning(|| {
            Ok(BucketProvision {
                bucket_name: BUCKET.to_string(),
                region: "us-east-1".to_string(),
                already_existed: true,
            })
        });

        let mut deployer = MockSiteDeployer::new();
        let c = calls.clone();
        deployer
            .expect_deploy()
            .returning(move |bucket, site_name, _, _| {
                c.deploys.fetch_add(1, Ordering::SeqCst);
                Ok(DeployedSite {
                    site_name: site_name.to_string(),
                    bucket_name: bucket.bucket_name.clone(),
                    serve_url: format!(
                        "https://{}.s3.amazonaws.com/sites/{}/index.html",
                        bucket.bucket_name, site_name
                    ),
                })
            });
        let c = calls.clone();
        deployer.expect_delete().returning(move |_| {
            c.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut dispatcher = MockRenderDispatcher::new();
        let c = calls.clone();
        dispatcher.expect_start().returning(move |bucket, request| {
            c.starts.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut requests) = c.render_requests.lock() {
                requests.push(request.clone());
            }
            Ok(RenderHandle {
                render_id: "r-1".to_string(),
                bucket_name: bucket.to_string(),
            })
        });
        let polls = AtomicUsize::new(0);
        dispatcher.expect_progress().returning(move |_| {
            match polls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(running(0.5)),
                _ => Ok(finished()),
            }
        });

        let mut retriever = MockArtifactRetriever::new();
        let c = calls.clone();
        retriever.expect_retrieve().returning(move |_, dest| {
            c.retrieves.fetch_add(1, Ordering::SeqCst);
            std::fs::write(dest, b"mp4-bytes")?;
            Ok(9)
        });

        let mut notifier = MockNotifier::new();
        let c = calls.clone();
        notifier.expect_notify().returning(move |notification| {
            if let Ok(mut sent) = c.notifications.lock() {
                sent.push(notification.clone());
            }
            Ok(())
        });

        let mut media = MockMediaToolkit::new();
        media.expect_fetch_source().returning(|_, dest| {
            std::fs::write(dest, b"source")?;
            Ok(6)
        });
        media.expect_extract_audio().returning(|_, audio| {
            std::fs::write(audio, b"wav")?;
            Ok(())
        });
        media
            .expect_probe_dimensions()
            .returning(|_| VideoDimensions {
                width: 1080,
                height: 1920,
            });
        media.expect_burn_subtitles().returning(|_, _, output| {
            std::fs::write(output, b"burned")?;
            Ok(())
        });

        Self {
            scenes,
            transcriber,
            provisioner,
            deployer,
            dispatcher,
            retriever,
            notifier,
            media,
            calls,
        }
    }

    pub fn build(self, config: WorkerConfig) -> (Arc<JobContext>, Arc<Calls>) {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        self.build_with_store(config, store)
    }

    pub fn build_with_store(
        self,
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
    ) -> (Arc<JobContext>, Arc<Calls>) {
        let ctx = JobContext {
            config: Arc::new(config),
            store,
            styles: Arc::new(StyleRegistry::with_builtin_styles()),
            collaborators: Collaborators {
                scenes: Arc::new(self.scenes),
                transcriber: Arc::new(self.transcriber),
                provisioner: Arc::new(self.provisioner),
                deployer: Arc::new(self.deployer),
                dispatcher: Arc::new(self.dispatcher),
                retriever: Arc::new(self.retriever),
                notifier: Arc::new(self.notifier),
                media: Arc::new(self.media),
            },
        };
        (Arc::new(ctx), self.calls)
    }
}
