//! **ResponseGenerator**: prompt → free-form generated text.
//!
//! The production backend speaks the OpenAI-compatible `/chat/completions` protocol
//! (OpenRouter by default). An absent or empty completion is returned as an empty
//! `GeneratedResponse`; the formatter turns that into `No response.`.

use crate::error::{PipelineError, PipelineResult};
use crate::prompts::ChatPrompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw text returned by the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedResponse {
    pub text: String,
    pub model: String,
}

impl GeneratedResponse {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, prompt: &ChatPrompt) -> PipelineResult<GeneratedResponse>;
}

/// Placeholder generator: echoes the question back. No network.
#[derive(Debug, Default)]
pub struct PlaceholderGenerator;

#[async_trait]
impl ResponseGenerator for PlaceholderGenerator {
    async fn generate(&self, prompt: &ChatPrompt) -> PipelineResult<GeneratedResponse> {
        Ok(GeneratedResponse {
            text: format!(
                "**Placeholder** reply (set VOXREPLY_LLM_API_KEY for real answers).\n- {}",
                prompt.user
            ),
            model: prompt.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// Extract the first choice's content; anything missing becomes empty text.
fn content_from_body(body: &str) -> PipelineResult<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::Generation(format!("response parse: {}", e)))?;
    Ok(parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .unwrap_or_default())
}

/// OpenAI-compatible chat completions client (OpenRouter, NVIDIA, OpenAI, local servers).
pub struct ChatCompletionsGenerator {
    base_url: String,
    api_key: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl ChatCompletionsGenerator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Generation(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into().trim().to_string(),
            temperature: None,
            max_tokens: None,
            client,
        })
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request(&self, prompt: &ChatPrompt) -> ChatRequest {
        ChatRequest {
            model: prompt.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }
}

#[async_trait]
impl ResponseGenerator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &ChatPrompt) -> PipelineResult<GeneratedResponse> {
        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("X-Title", "voxreply")
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| PipelineError::Generation(format!("request failed: {}", e)))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;
        if !status.is_success() {
            return Err(PipelineError::Generation(format!(
                "API error {}: {}",
                status, body
            )));
        }

        Ok(GeneratedResponse {
            text: content_from_body(&body)?,
            model: prompt.model.clone(),
        })
    }
}
