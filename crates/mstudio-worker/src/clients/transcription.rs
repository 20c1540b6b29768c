//! OpenAI-compatible transcription client with word timestamps.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use mstudio_models::TimestampedWord;

use crate::error::{WorkerError, WorkerResult};
use crate::remote::Transcriber;

#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Biases the model towards punctuated output
    pub prompt: Option<String>,
    pub language: Option<String>,
    pub timeout: Duration,
}

impl TranscriptionConfig {
    pub fn from_env() -> WorkerResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| WorkerError::config("OPENAI_API_KEY not set"))?;

        Ok(Self {
            api_key,
            base_url: std::env::var("OPENAI_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: std::env::var("TRANSCRIPTION_MODEL").unwrap_or_else(|_| "whisper-1".to_string()),
            prompt: Some(std::env::var("TRANSCRIPTION_PROMPT").unwrap_or_else(|_| {
                "Include all punctuation: commas, periods, exclamation and question marks."
                    .to_string()
            }))
            .filter(|p| !p.is_empty()),
            language: std::env::var("TRANSCRIPTION_LANGUAGE").ok().filter(|l| !l.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("TRANSCRIPTION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        })
    }
}

/// [`Transcriber`] calling `POST {base_url}/audio/transcriptions`.
pub struct WhisperTranscriber {
    config: TranscriptionConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    words: Option<Vec<ApiWord>>,
}

#[derive(Debug, Deserialize)]
struct ApiWord {
    word: String,
    start: f64,
    end: f64,
}

impl WhisperTranscriber {
    pub fn new(config: TranscriptionConfig) -> WorkerResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> WorkerResult<Self> {
        Self::new(TranscriptionConfig::from_env()?)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &Path) -> WorkerResult<Vec<TimestampedWord>> {
        let bytes = tokio::fs::read(audio).await?;
        info!(audio = ?audio, bytes = bytes.len(), "Transcribing audio");

        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word");
        if let Some(prompt) = &self.config.prompt {
            form = form.text("prompt", prompt.clone());
        }
        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| WorkerError::transcription(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            return Err(WorkerError::transcription(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let transcription: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| WorkerError::transcription(format!("unreadable response: {}", e)))?;

        let words = normalize_words(transcription.words.unwrap_or_default());
        debug!(words = words.len(), "Transcription complete");
        Ok(words)
    }
}

/// Trim, drop blanks, repair inverted ranges and sort by start time.
fn normalize_words(words: Vec<ApiWord>) -> Vec<TimestampedWord> {
    let mut words: Vec<TimestampedWord> = words
        .into_iter()
        .filter_map(|w| {
            let text = w.word.trim();
            if text.is_empty() || !w.start.is_finite() || !w.end.is_finite() {
                return None;
            }
            let start = w.start.max(0.0);
            Some(TimestampedWord::new(text, start, w.end.max(start)))
        })
        .collect();
    words.sort_by(|a, b| a.start.total_cmp(&b.start));
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transcriber(server: &MockServer) -> WhisperTranscriber {
        WhisperTranscriber::new(TranscriptionConfig {
            api_key: "sk-test".to_string(),
            base_url: server.uri(),
            model: "whisper-1".to_string(),
            prompt: None,
            language: None,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn audio_file() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        std::fs::write(file.path(), b"RIFF....WAVE").unwrap();
        file
    }

    #[tokio::test]
    async fn test_transcribe_words() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "The quick brown",
                "words": [
                    { "word": " quick", "start": 0.5, "end": 0.8 },
                    { "word": "The", "start": 0.0, "end": 0.4 },
                    { "word": "brown", "start": 0.9, "end": 1.2 }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let audio = audio_file();
        let words = transcriber(&server).transcribe(audio.path()).await.unwrap();
        let texts: Vec<&str> = words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(texts, vec!["The", "quick", "brown"]);
        assert_eq!(words[1].start, 0.5);
    }

    #[tokio::test]
    async fn test_no_speech_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "" })))
            .mount(&server)
            .await;

        let audio = audio_file();
        let words = transcriber(&server).transcribe(audio.path()).await.unwrap();
        assert!(words.is_empty());
    }

    #[tokio::test]
    async fn test_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let audio = audio_file();
        let err = transcriber(&server).transcribe(audio.path()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Transcription(_)));
    }

    #[test]
    fn test_normalize_repairs_ranges() {
        let words = normalize_words(vec![
            ApiWord { word: "  ".into(), start: 0.0, end: 0.1 },
            ApiWord { word: "late".into(), start: 2.0, end: 1.5 },
        ]);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].end, 2.0);
    }
}
