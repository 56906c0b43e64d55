//! **Speech-to-Text (STT)**: canonical waveform → `Transcript`.
//!
//! Implement `SpeechTranscriber` for any engine. The engine's "nothing recognized" outcome
//! must surface as `PipelineError::UnrecognizedSpeech`; transport and service failures as
//! `PipelineError::RecognitionService`.

use crate::error::{PipelineError, PipelineResult};
use crate::transcode::TranscodedAudio;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Recognized utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    /// Engine-defined confidence, when the engine reports one.
    pub confidence: Option<f32>,
    pub recognized_at: DateTime<Utc>,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
            recognized_at: Utc::now(),
        }
    }
}

/// Backend for converting the canonical waveform to text.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(&self, audio: &TranscodedAudio) -> PipelineResult<Transcript>;
}

/// Placeholder STT: returns a fixed transcript. Use to exercise the pipeline without an API.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, return this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

#[async_trait]
impl SpeechTranscriber for PlaceholderStt {
    async fn transcribe(&self, audio: &TranscodedAudio) -> PipelineResult<Transcript> {
        if let Some(ref r) = self.response {
            return Ok(Transcript::new(r.clone()));
        }
        Ok(Transcript::new(format!(
            "[STT placeholder: {} frames, {:.1}s; set STT_API_KEY for real transcription]",
            audio.frames,
            audio.duration().as_secs_f32()
        )))
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Turn a transcription API body into a transcript; blank text means nothing was recognized.
fn transcript_from_body(body: &str) -> PipelineResult<Transcript> {
    let parsed: TranscriptionResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::RecognitionService(format!("invalid STT response: {}", e)))?;
    let text = parsed.text.unwrap_or_default().trim().to_string();
    if text.is_empty() {
        return Err(PipelineError::UnrecognizedSpeech);
    }
    Ok(Transcript::new(text))
}

/// OpenAI-compatible transcription API (`POST {base_url}/audio/transcriptions`).
#[derive(Debug, Clone)]
pub struct OpenAiSttClient {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    api_key: String,
    /// Model: whisper-1, gpt-4o-transcribe, etc.
    pub model: String,
    /// Optional ISO-639-1 hint.
    pub language: Option<String>,
    client: reqwest::Client,
}

impl OpenAiSttClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::RecognitionService(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            language: None,
            client,
        })
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechTranscriber for OpenAiSttClient {
    async fn transcribe(&self, audio: &TranscodedAudio) -> PipelineResult<Transcript> {
        if audio.is_empty() {
            return Err(PipelineError::UnrecognizedSpeech);
        }
        let wav = tokio::fs::read(audio.path())
            .await
            .map_err(|e| PipelineError::RecognitionService(format!("reading waveform: {}", e)))?;
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| PipelineError::RecognitionService(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }

        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::RecognitionService(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| PipelineError::RecognitionService(e.to_string()))?;
        if !status.is_success() {
            return Err(PipelineError::RecognitionService(format!(
                "STT API error {}: {}",
                status, body
            )));
        }
        transcript_from_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_with_text_is_a_transcript() {
        let t = transcript_from_body(r#"{"text": "  Tell me about yourself. "}"#).unwrap();
        assert_eq!(t.text, "Tell me about yourself.");
        assert_eq!(t.confidence, None);
    }

    #[test]
    fn blank_or_missing_text_is_unrecognized() {
        assert!(matches!(
            transcript_from_body(r#"{"text": "   "}"#),
            Err(PipelineError::UnrecognizedSpeech)
        ));
        assert!(matches!(
            transcript_from_body("{}"),
            Err(PipelineError::UnrecognizedSpeech)
        ));
    }

    #[test]
    fn malformed_body_is_service_error() {
        assert!(matches!(
            transcript_from_body("<html>502</html>"),
            Err(PipelineError::RecognitionService(_))
        ));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let stt = OpenAiSttClient::new(
            "https://api.openai.com/v1/",
            "k",
            "whisper-1",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(stt.endpoint(), "https://api.openai.com/v1/audio/transcriptions");
    }
}
