//! Local media operations behind a mockable seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::command::{escape_filter_path, FfmpegCommand, FfmpegRunner};
use crate::download::download_to_file;
use crate::error::MediaResult;
use crate::probe::probe_video;

/// Sample rate expected by the transcription backend.
pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16_000;

/// Frame size of a source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoDimensions {
    /// 1920x1080, used whenever probing fails.
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Media operations the caption pipeline needs.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Download the source video. Returns the byte count.
    async fn fetch_source(&self, url: &str, dest: &Path) -> MediaResult<u64>;

    /// Extract 16 kHz mono audio suitable for transcription.
    async fn extract_audio(&self, video: &Path, audio: &Path) -> MediaResult<()>;

    /// Frame size of `video`, falling back to 1920x1080 when unknown.
    async fn probe_dimensions(&self, video: &Path) -> VideoDimensions;

    /// Hard-burn SubRip subtitles into `video`.
    async fn burn_subtitles(&self, video: &Path, subtitles: &Path, output: &Path) -> MediaResult<()>;
}

/// [`MediaToolkit`] backed by reqwest and the ffmpeg/ffprobe CLIs.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    http: reqwest::Client,
    runner: FfmpegRunner,
}

impl FfmpegToolkit {
    pub fn new(http: reqwest::Client, ffmpeg_timeout_secs: u64) -> Self {
        Self {
            http,
            runner: FfmpegRunner::new().with_timeout(ffmpeg_timeout_secs),
        }
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn fetch_source(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        download_to_file(&self.http, url, dest).await
    }

    async fn extract_audio(&self, video: &Path, audio: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(video, audio)
            .no_video()
            .audio_format(TRANSCRIPTION_SAMPLE_RATE, 1);
        self.runner.run(&cmd).await
    }

    async fn probe_dimensions(&self, video: &Path) -> VideoDimensions {
        match probe_video(video).await {
            Ok(info) if info.width > 0 && info.height > 0 => VideoDimensions {
                width: info.width,
                height: info.height,
            },
            Ok(_) => {
                warn!(video = ?video, "Probe returned no frame size, using default");
                VideoDimensions::default()
            }
            Err(e) => {
                warn!(video = ?video, error = %e, "Probe failed, using default frame size");
                VideoDimensions::default()
            }
        }
    }

    async fn burn_subtitles(&self, video: &Path, subtitles: &Path, output: &Path) -> MediaResult<()> {
        let total_secs = probe_video(video).await.map(|i| i.duration).unwrap_or(0.0);

        let cmd = FfmpegCommand::new(video, output)
            .video_filter(format!("subtitles={}", escape_filter_path(subtitles)))
            .video_codec("libx264")
            .preset("veryfast")
            .audio_codec("copy");

        self.runner
            .run_with_progress(&cmd, move |p| {
                debug!(
                    percent = p.percent_of(total_secs),
                    frame = p.frame,
                    speed = p.speed,
                    "Subtitle burn progress"
                );
            })
            .await
    }
}
