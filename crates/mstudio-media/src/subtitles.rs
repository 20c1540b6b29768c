//! SubRip export for the local burn-in path.

use mstudio_models::WordGroup;
use std::fmt::Write;

/// Format seconds as `HH:MM:SS,mmm`.
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        ms
    )
}

/// One cue per word group.
pub fn to_srt(groups: &[WordGroup]) -> String {
    let mut out = String::new();
    let mut index = 1;

    for group in groups {
        let (Some(start), Some(end)) = (group.start(), group.end()) else {
            continue;
        };
        let text = group.text();
        if text.trim().is_empty() {
            continue;
        }

        let _ = writeln!(out, "{}", index);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_srt_timestamp(start),
            format_srt_timestamp(end.max(start))
        );
        let _ = writeln!(out, "{}", text.trim());
        out.push('\n');
        index += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::group_words;
    use mstudio_models::TimestampedWord;

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_srt_timestamp(1.5), "00:00:01,500");
        assert_eq!(format_srt_timestamp(3723.042), "01:02:03,042");
        assert_eq!(format_srt_timestamp(-2.0), "00:00:00,000");
    }

    #[test]
    fn test_to_srt() {
        let words = vec![
            TimestampedWord::new("Hello", 0.0, 0.4),
            TimestampedWord::new("there", 0.4, 0.9),
            TimestampedWord::new("general", 1.2, 1.6),
            TimestampedWord::new("Kenobi", 1.6, 2.1),
        ];
        let groups = group_words(&words, 2);
        let srt = to_srt(&groups);

        // Four words with a target of two become one absorbed group of three plus one.
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,600\nHello there general\n\n\
             2\n00:00:01,600 --> 00:00:02,100\nKenobi\n\n"
        );
    }

    #[test]
    fn test_empty_groups() {
        assert_eq!(to_srt(&[]), "");
    }
}
