//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Lines of non-progress stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before -i
    input_args: Vec<String>,
    /// Arguments placed after -i
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add a single input argument.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_args(["-vn"])
    }

    /// Resample audio to `rate` Hz with `channels` channels.
    pub fn audio_format(self, rate: u32, channels: u8) -> Self {
        self.output_args(["-ar".to_string(), rate.to_string(), "-ac".to_string(), channels.to_string()])
    }

    /// Set the video filter chain.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_args(["-vf".to_string(), filter.into()])
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_args(["-c:v".to_string(), codec.into()])
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_args(["-c:a".to_string(), codec.into()])
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_args(["-preset".to_string(), preset.into()])
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Progress snapshot parsed from `-progress pipe:2`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Percentage of `total_secs` already written.
    pub fn percent_of(&self, total_secs: f64) -> u8 {
        if total_secs <= 0.0 {
            return 0;
        }
        let pct = (self.out_time_ms as f64 / 1000.0) / total_secs * 100.0;
        pct.clamp(0.0, 100.0).round() as u8
    }
}

/// Runner for FFmpeg commands with progress tracking and a wall-clock timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the process if it runs longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stderr not captured"))?;
        let mut reader = BufReader::new(stderr).lines();

        let stderr_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                match parse_progress_line(&line, &mut current) {
                    LineKind::Snapshot => progress_callback(current.clone()),
                    LineKind::Field => {}
                    LineKind::Other => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            }

            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let result = self.wait_for_completion(&mut child).await;
        let stderr_tail = stderr_handle.await.unwrap_or_default();

        match result {
            Err(MediaError::FfmpegFailed {
                message, exit_code, ..
            }) => Err(MediaError::ffmpeg_failed(
                message,
                (!stderr_tail.is_empty()).then_some(stderr_tail),
                exit_code,
            )),
            other => other,
        }
    }

    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let status = match self.timeout_secs {
            Some(timeout_secs) => {
                match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), child.wait())
                    .await
                {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!("FFmpeg timed out after {} seconds, killing process", timeout_secs);
                        let _ = child.kill().await;
                        return Err(MediaError::Timeout(timeout_secs));
                    }
                }
            }
            None => child.wait().await?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

#[derive(Debug, PartialEq)]
enum LineKind {
    /// `progress=` line closing a snapshot
    Snapshot,
    /// Any other `key=value` progress field
    Field,
    /// Regular diagnostics
    Other,
}

fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> LineKind {
    let line = line.trim();
    let Some((key, value)) = line.split_once('=') else {
        return LineKind::Other;
    };

    match key {
        "out_time_ms" | "out_time_us" => {
            // Despite its name, out_time_ms is reported in microseconds
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return LineKind::Snapshot;
        }
        "fps" | "bitrate" | "total_size" | "out_time" | "dup_frames" | "drop_frames" => {}
        k if k.starts_with("stream_") => {}
        _ => return LineKind::Other,
    }

    LineKind::Field
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Escape a path for use inside a filtergraph argument such as `subtitles=`.
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '\\' | ':' | '\'' | ',' | '[' | ']' | ';' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_order() {
        let cmd = FfmpegCommand::new("/tmp/in.mp4", "/tmp/out.wav")
            .no_video()
            .audio_format(16000, 1);
        let args = cmd.build_args();

        assert_eq!(&args[..5], &["-y", "-v", "error", "-progress", "pipe:2"]);
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/tmp/in.mp4");
        assert_eq!(&args[i + 2..], &["-vn", "-ar", "16000", "-ac", "1", "/tmp/out.wav"]);
    }

    #[test]
    fn test_parse_progress_lines() {
        let mut p = FfmpegProgress::default();
        assert_eq!(parse_progress_line("frame=120", &mut p), LineKind::Field);
        assert_eq!(parse_progress_line("out_time_us=4000000", &mut p), LineKind::Field);
        assert_eq!(parse_progress_line("speed=2.5x", &mut p), LineKind::Field);
        assert_eq!(parse_progress_line("progress=continue", &mut p), LineKind::Snapshot);
        assert_eq!(p.frame, 120);
        assert_eq!(p.out_time_ms, 4000);
        assert_eq!(p.speed, 2.5);
        assert!(!p.is_complete);
        assert_eq!(p.percent_of(8.0), 50);

        assert_eq!(parse_progress_line("progress=end", &mut p), LineKind::Snapshot);
        assert!(p.is_complete);
    }

    #[test]
    fn test_diagnostics_are_not_progress() {
        let mut p = FfmpegProgress::default();
        assert_eq!(
            parse_progress_line("Unable to open subtitles.srt", &mut p),
            LineKind::Other
        );
        assert_eq!(parse_progress_line("speed=N/A", &mut p), LineKind::Field);
        assert_eq!(p.speed, 0.0);
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(
            escape_filter_path(Path::new("/tmp/job:1/sub's.srt")),
            "/tmp/job\\:1/sub\\'s.srt"
        );
    }
}
