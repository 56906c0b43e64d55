//! **Speech synthesis (TTS)**: generated text → encoded audio for transport.

use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::time::Duration;

/// Spoken rendition of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    /// e.g. `audio/mpeg`.
    pub mime_type: String,
}

impl SynthesizedAudio {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Standard base64 for embedding in JSON.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

/// Backend that turns text into audio bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> PipelineResult<SynthesizedAudio>;
}

/// Placeholder TTS: returns empty audio.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

#[async_trait]
impl SpeechSynthesizer for PlaceholderTts {
    async fn synthesize(&self, _text: &str) -> PipelineResult<SynthesizedAudio> {
        Ok(SynthesizedAudio {
            bytes: Vec::new(),
            mime_type: "audio/mpeg".to_string(),
        })
    }
}

/// OpenAI-compatible speech API (`POST {base_url}/audio/speech`).
#[derive(Debug, Clone)]
pub struct OpenAiTtsClient {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    api_key: String,
    /// tts-1 (fast) or tts-1-hd.
    pub model: String,
    /// alloy, echo, fable, onyx, nova, shimmer, ...
    pub voice: String,
    client: reqwest::Client,
}

impl OpenAiTtsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiTtsClient {
    async fn synthesize(&self, text: &str) -> PipelineResult<SynthesizedAudio> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SynthesizedAudio {
                bytes: Vec::new(),
                mime_type: "audio/mpeg".to_string(),
            });
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "mp3",
        });
        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(PipelineError::Synthesis(format!(
                "TTS API error {}: {}",
                status, body
            )));
        }
        let mime_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;
        Ok(SynthesizedAudio {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }
}
