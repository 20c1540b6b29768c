//! Word-level transcription types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single transcribed word with its time window in seconds.
///
/// Sequences of words are expected sorted by `start`, with `end >= start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimestampedWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl TimestampedWord {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }

    /// Duration of the word in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// A contiguous slice of the word sequence shown together on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordGroup {
    /// Index of the first word of this group in the original sequence
    pub start_index: usize,
    /// Words in original order
    pub words: Vec<TimestampedWord>,
}

impl WordGroup {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Index one past the last word of this group.
    pub fn end_index(&self) -> usize {
        self.start_index + self.words.len()
    }

    /// Start time of the first word.
    pub fn start(&self) -> Option<f64> {
        self.words.first().map(|w| w.start)
    }

    /// End time of the last word.
    pub fn end(&self) -> Option<f64> {
        self.words.last().map(|w| w.end)
    }

    /// Space-joined text of the group.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.word.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_accessors() {
        let group = WordGroup {
            start_index: 3,
            words: vec![
                TimestampedWord::new("hello", 1.0, 1.4),
                TimestampedWord::new(" world", 1.4, 2.0),
            ],
        };
        assert_eq!(group.end_index(), 5);
        assert_eq!(group.start(), Some(1.0));
        assert_eq!(group.end(), Some(2.0));
        assert_eq!(group.text(), "hello world");
    }

    #[test]
    fn test_word_deserializes_from_transcription_shape() {
        let json = r#"{"word":"fox","start":0.8,"end":1.1}"#;
        let word: TimestampedWord = serde_json::from_str(json).unwrap();
        assert_eq!(word.word, "fox");
        assert!((word.duration() - 0.3).abs() < 1e-9);
    }
}
