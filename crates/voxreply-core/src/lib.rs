//! # VoxReply - spoken question in, formatted answer out
//!
//! One request flows through a fixed chain of stages:
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌─────────┐   ┌────────────┐   ┌───────────┐
//! │   Upload   │ → │  Transcode  │ → │   STT   │ → │ Generation │ → │ Formatter │
//! │ (scratch)  │   │  (ffmpeg)   │   │         │   │ (chat API) │   │  (markup) │
//! └────────────┘   └─────────────┘   └─────────┘   └────────────┘   └───────────┘
//!                                                         ↓
//!                                                  ┌────────────┐
//!                                                  │    TTS     │ (per profile)
//!                                                  └────────────┘
//! ```
//!
//! Every external engine sits behind a trait (`AudioTranscoder`, `SpeechTranscriber`,
//! `ResponseGenerator`, `SpeechSynthesizer`) so the pipeline can run against placeholders.

pub mod config;
pub mod error;
pub mod formatter;
pub mod generate;
pub mod pipeline;
pub mod prompts;
pub mod stt;
pub mod transcode;
pub mod tts;
pub mod upload;

pub use config::{AppConfig, Profile, SynthesisFailurePolicy, DEFAULT_PROFILE};
pub use error::{ConfigError, PipelineError, PipelineResult, Stage};
pub use formatter::{format_response, wrap_scrollable, Document, ListKind, Span, Token, NO_RESPONSE};
pub use generate::{ChatCompletionsGenerator, GeneratedResponse, PlaceholderGenerator, ResponseGenerator};
pub use pipeline::{PipelineReply, ResponsePipeline};
pub use prompts::ChatPrompt;
pub use stt::{OpenAiSttClient, PlaceholderStt, SpeechTranscriber, Transcript};
pub use transcode::{AudioTranscoder, FfmpegTranscoder, TranscodedAudio};
pub use tts::{OpenAiTtsClient, PlaceholderTts, SpeechSynthesizer, SynthesizedAudio};
pub use upload::{ScratchFile, UploadIngestor, UploadedAudio};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
