//! Caption timing and media tooling.
//!
//! This crate provides:
//! - The caption timing index (word grouping, frame activity queries)
//! - Data-driven caption styles and frame-accurate caption tracks
//! - SubRip export for local subtitle burn-in
//! - FFmpeg/FFprobe CLI wrappers and streaming source download
//! - The bundled caption composition template

pub mod command;
pub mod download;
pub mod error;
pub mod probe;
pub mod styles;
pub mod subtitles;
pub mod timing;
pub mod toolkit;
pub mod track;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegProgress, FfmpegRunner};
pub use download::download_to_file;
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, VideoInfo};
pub use styles::{
    Animation, CaptionStyle, Grouping, Highlight, Position, Spring, StyleRegistry, TextLook,
    FALLBACK_STYLE_ID,
};
pub use subtitles::{format_srt_timestamp, to_srt};
pub use timing::{
    caption_duration_frames, find_active_group, find_active_word, find_current_active_word,
    group_words, is_word_active, to_frame, Frame,
};
pub use toolkit::{FfmpegToolkit, MediaToolkit, VideoDimensions};
#[cfg(any(test, feature = "test-util"))]
pub use toolkit::MockMediaToolkit;
pub use track::{
    build_caption_track, render_frame, CaptionRenderer, CaptionSpan, CaptionTrack, EmojiOverlay,
    FrameVisual, VisualWord,
};

/// File name of the caption composition inside a deployed site.
pub const CAPTIONS_COMPOSITION_FILE: &str = "CaptionsComposition.jsx";

/// Composition that draws a [`CaptionTrack`] over the source video.
pub const CAPTIONS_COMPOSITION_SOURCE: &str = include_str!("../assets/CaptionsComposition.jsx");
