//! Frame-accurate caption visuals.
//!
//! [`CaptionRenderer::render_frame`] answers "what is on screen at frame N"
//! for a style, and [`build_caption_track`] evaluates every frame once and
//! collapses identical consecutive frames into spans. The resulting
//! [`CaptionTrack`] is the complete set of props the remote composition
//! draws from, so the composition itself holds no timing logic.

use serde::{Deserialize, Serialize};

use mstudio_models::{EmojiCue, TimestampedWord, WordGroup};

use crate::styles::{Animation, CaptionStyle, Grouping, Highlight, Spring};
use crate::timing::{
    current_word_offset, find_active_group, find_active_word, group_window, group_words,
    interpolate_clamped, is_word_active, to_frame, Frame,
};

/// Frames an emoji cue stays visible after its start frame.
pub const EMOJI_VISIBLE_FRAMES: Frame = 60;

/// Horizontal slots (percent of width) emoji overlays rotate through.
pub const EMOJI_SLOTS: [u8; 3] = [25, 50, 75];

/// A word as drawn in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualWord {
    pub text: String,
    pub active: bool,
}

/// An emoji overlay as drawn in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmojiOverlay {
    pub url: String,
    pub left_percent: u8,
    pub scale: f64,
}

/// Everything the composition needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameVisual {
    pub opacity: f64,
    pub scale: f64,
    pub words: Vec<VisualWord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emojis: Vec<EmojiOverlay>,
}

/// Inclusive frame range sharing one visual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionSpan {
    pub start_frame: Frame,
    pub end_frame: Frame,
    pub visual: FrameVisual,
}

/// Input props of the caption composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub style: CaptionStyle,
    pub fps: u32,
    pub duration_in_frames: Frame,
    pub spans: Vec<CaptionSpan>,
}

impl CaptionTrack {
    /// Visual at `frame`, if any span covers it.
    pub fn visual_at(&self, frame: Frame) -> Option<&FrameVisual> {
        let idx = self
            .spans
            .partition_point(|span| span.end_frame < frame);
        self.spans
            .get(idx)
            .filter(|span| span.start_frame <= frame)
            .map(|span| &span.visual)
    }
}

/// Rounded to three decimals so equal-looking frames compare equal.
fn quantize(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Per-style view over a transcript.
#[derive(Debug, Clone)]
pub struct CaptionRenderer<'a> {
    style: &'a CaptionStyle,
    words: &'a [TimestampedWord],
    groups: Vec<WordGroup>,
    fps: u32,
    cues: &'a [EmojiCue],
}

impl<'a> CaptionRenderer<'a> {
    pub fn new(
        style: &'a CaptionStyle,
        words: &'a [TimestampedWord],
        fps: u32,
        cues: &'a [EmojiCue],
    ) -> Self {
        let groups = match style.grouping {
            Grouping::Group(size) => group_words(words, size),
            Grouping::SingleWord => Vec::new(),
        };
        Self {
            style,
            words,
            groups,
            fps,
            cues: if style.emoji_overlays { cues } else { &[] },
        }
    }

    pub fn groups(&self) -> &[WordGroup] {
        &self.groups
    }

    /// Visual description of `frame`, or `None` when nothing is drawn.
    pub fn render_frame(&self, frame: Frame) -> Option<FrameVisual> {
        let emojis = self.emojis_at(frame);
        let caption = match self.style.grouping {
            Grouping::Group(_) => self.render_group(frame),
            Grouping::SingleWord => self.render_single_word(frame),
        };

        match caption {
            Some(mut visual) => {
                visual.emojis = emojis;
                Some(visual)
            }
            None if !emojis.is_empty() => Some(FrameVisual {
                opacity: 1.0,
                scale: 1.0,
                words: Vec::new(),
                emojis,
            }),
            None => None,
        }
    }

    fn render_group(&self, frame: Frame) -> Option<FrameVisual> {
        let group = find_active_group(&self.groups, frame, self.fps)?;
        let (start, end) = group_window(group, self.fps)?;

        let (opacity, scale) = match self.style.animation {
            Animation::Fade {
                in_frames,
                out_frames,
            } => {
                let f = frame as f64;
                let fade_in = if in_frames == 0 {
                    1.0
                } else {
                    interpolate_clamped(f, start as f64, (start + in_frames) as f64, 0.0, 1.0)
                };
                let fade_out = if out_frames == 0 {
                    1.0
                } else {
                    interpolate_clamped(f, end as f64 - out_frames as f64, end as f64, 1.0, 0.0)
                };
                (fade_in * fade_out, 1.0)
            }
            Animation::Pop { from_scale, spring } => {
                (1.0, pop_scale(from_scale, spring, frame, start, self.fps))
            }
        };

        let current = match self.style.highlight {
            Highlight::CurrentWord => current_word_offset(group, frame, self.fps),
            _ => None,
        };

        let words = group
            .words
            .iter()
            .enumerate()
            .map(|(i, w)| VisualWord {
                text: w.word.clone(),
                active: match self.style.highlight {
                    Highlight::ActiveWord => is_word_active(w, frame, self.fps),
                    Highlight::CurrentWord => current == Some(i),
                    Highlight::None => false,
                },
            })
            .collect();

        Some(FrameVisual {
            opacity: quantize(opacity),
            scale: quantize(scale),
            words,
            emojis: Vec::new(),
        })
    }

    fn render_single_word(&self, frame: Frame) -> Option<FrameVisual> {
        let word = find_active_word(self.words, frame, self.fps)?;
        let start = to_frame(word.start, self.fps);

        let (opacity, scale) = match self.style.animation {
            Animation::Pop { from_scale, spring } => {
                (1.0, pop_scale(from_scale, spring, frame, start, self.fps))
            }
            Animation::Fade { in_frames, .. } if in_frames > 0 => (
                interpolate_clamped(
                    frame as f64,
                    start as f64,
                    (start + in_frames) as f64,
                    0.0,
                    1.0,
                ),
                1.0,
            ),
            Animation::Fade { .. } => (1.0, 1.0),
        };

        Some(FrameVisual {
            opacity: quantize(opacity),
            scale: quantize(scale),
            words: vec![VisualWord {
                text: word.word.clone(),
                active: self.style.highlight != Highlight::None,
            }],
            emojis: Vec::new(),
        })
    }

    fn emojis_at(&self, frame: Frame) -> Vec<EmojiOverlay> {
        self.cues
            .iter()
            .filter(|cue| frame >= cue.start_frame && frame <= cue.start_frame.saturating_add(EMOJI_VISIBLE_FRAMES))
            .enumerate()
            .map(|(i, cue)| EmojiOverlay {
                url: cue.emoji_url.clone(),
                left_percent: EMOJI_SLOTS[i % EMOJI_SLOTS.len()],
                scale: quantize(
                    Spring::SNAPPY.value((frame - cue.start_frame) as f64, self.fps),
                ),
            })
            .collect()
    }
}

fn pop_scale(from_scale: f64, spring: Spring, frame: Frame, start: Frame, fps: u32) -> f64 {
    let progress = spring.value(frame as f64 - start as f64, fps);
    from_scale + (1.0 - from_scale) * progress
}

/// Evaluate `frame` in isolation.
pub fn render_frame(
    style: &CaptionStyle,
    words: &[TimestampedWord],
    frame: Frame,
    fps: u32,
    cues: &[EmojiCue],
) -> Option<FrameVisual> {
    CaptionRenderer::new(style, words, fps, cues).render_frame(frame)
}

/// Evaluate frames `0..duration_in_frames` and merge identical neighbours.
pub fn build_caption_track(
    style: &CaptionStyle,
    words: &[TimestampedWord],
    fps: u32,
    duration_in_frames: Frame,
    cues: &[EmojiCue],
) -> CaptionTrack {
    let renderer = CaptionRenderer::new(style, words, fps, cues);
    let mut spans: Vec<CaptionSpan> = Vec::new();

    for frame in 0..duration_in_frames {
        let Some(visual) = renderer.render_frame(frame) else {
            continue;
        };

        match spans.last_mut() {
            Some(last) if last.end_frame + 1 == frame && last.visual == visual => {
                last.end_frame = frame;
            }
            _ => spans.push(CaptionSpan {
                start_frame: frame,
                end_frame: frame,
                visual,
            }),
        }
    }

    CaptionTrack {
        style: style.clone(),
        fps,
        duration_in_frames,
        spans,
    }
}
