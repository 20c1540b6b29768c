//! Caption timing index.
//!
//! Pure conversions between word timestamps (seconds) and frame-indexed
//! activity queries. Nothing here performs I/O or keeps state, so every
//! answer is reproducible frame-by-frame for any style.
//!
//! Preconditions (caller contract, not checked): words are sorted by
//! `start`, every `end >= start`, and no time is negative.
//!
//! Frames use `f64::round`, i.e. round-half-away-from-zero: 0.5 s at 25 fps
//! (12.5) lands on frame 13.

use mstudio_models::{TimestampedWord, WordGroup};

/// Output frame index.
pub type Frame = u32;

/// Seconds of tail kept on screen after the last word of a caption render.
pub const CAPTION_TAIL_SECONDS: f64 = 0.5;

/// Convert a time in seconds to a frame index.
pub fn to_frame(seconds: f64, fps: u32) -> Frame {
    (seconds * fps as f64).round() as Frame
}

/// Split words into display groups of roughly `target_size`.
///
/// Takes `target_size` words while at least `2 * target_size + 1` remain,
/// then `target_size + 1` while at least `target_size + 1` remain, then
/// everything left. The `+ 1` take absorbs the word that would otherwise
/// end up alone in the next group. A `target_size` of 0 behaves like 1.
pub fn group_words(words: &[TimestampedWord], target_size: usize) -> Vec<WordGroup> {
    let size = target_size.max(1);
    let mut groups = Vec::new();
    let mut i = 0;

    while i < words.len() {
        let remaining = words.len() - i;
        let take = if remaining > 2 * size {
            size
        } else if remaining > size {
            size + 1
        } else {
            remaining
        };

        groups.push(WordGroup {
            start_index: i,
            words: words[i..i + take].to_vec(),
        });
        i += take;
    }

    groups
}

/// Inclusive frame window `[start, end]` of a group.
pub fn group_window(group: &WordGroup, fps: u32) -> Option<(Frame, Frame)> {
    let start = group.start()?;
    let end = group.end()?;
    Some((to_frame(start, fps), to_frame(end, fps)))
}

/// First group whose inclusive window contains `frame`.
pub fn find_active_group(groups: &[WordGroup], frame: Frame, fps: u32) -> Option<&WordGroup> {
    groups.iter().find(|group| {
        group_window(group, fps)
            .map(|(start, end)| frame >= start && frame <= end)
            .unwrap_or(false)
    })
}

/// Whether `frame` lies inside the word's inclusive window.
pub fn is_word_active(word: &TimestampedWord, frame: Frame, fps: u32) -> bool {
    frame >= to_frame(word.start, fps) && frame <= to_frame(word.end, fps)
}

/// Most recently started word of the group at `frame`.
///
/// Unlike [`is_word_active`] the word stays current after its own end until
/// the next word starts.
pub fn find_current_active_word(
    group: &WordGroup,
    frame: Frame,
    fps: u32,
) -> Option<&TimestampedWord> {
    group
        .words
        .iter()
        .rev()
        .find(|w| to_frame(w.start, fps) <= frame)
}

/// Position of [`find_current_active_word`] inside the group.
pub fn current_word_offset(group: &WordGroup, frame: Frame, fps: u32) -> Option<usize> {
    group
        .words
        .iter()
        .rposition(|w| to_frame(w.start, fps) <= frame)
}

/// First word active at `frame`, scanning the whole sequence.
pub fn find_active_word(words: &[TimestampedWord], frame: Frame, fps: u32) -> Option<&TimestampedWord> {
    words.iter().find(|w| is_word_active(w, frame, fps))
}

/// Length of a caption render covering every word plus a short tail.
pub fn caption_duration_frames(words: &[TimestampedWord], fps: u32) -> Frame {
    match words.last() {
        Some(last) => ((last.end + CAPTION_TAIL_SECONDS) * fps as f64).ceil() as Frame,
        None => 0,
    }
}

/// Linear interpolation of `frame` from `[from, to]` onto `[a, b]`, clamped.
pub fn interpolate_clamped(frame: f64, from: f64, to: f64, a: f64, b: f64) -> f64 {
    if to <= from {
        return if frame >= to { b } else { a };
    }
    let t = ((frame - from) / (to - from)).clamp(0.0, 1.0);
    a + (b - a) * t
}
