//! **ResponsePipeline**: one linear pass per request.
//!
//! ```text
//! UploadedAudio → ScratchFile → TranscodedAudio → Transcript → GeneratedResponse → Document
//!                                                                               ↘ SynthesizedAudio (profile.synthesize)
//! ```
//!
//! The first failing stage short-circuits the run. Nothing is retried. The pipeline holds
//! only immutable adapters, so a single instance serves concurrent requests.

use crate::config::{AppConfig, Profile, SynthesisFailurePolicy};
use crate::error::{ConfigError, PipelineError, PipelineResult};
use crate::formatter::{format_response, Document, NO_RESPONSE};
use crate::generate::{ChatCompletionsGenerator, GeneratedResponse, PlaceholderGenerator, ResponseGenerator};
use crate::prompts::ChatPrompt;
use crate::stt::{OpenAiSttClient, PlaceholderStt, SpeechTranscriber, Transcript};
use crate::transcode::{AudioTranscoder, FfmpegTranscoder};
use crate::tts::{OpenAiTtsClient, PlaceholderTts, SpeechSynthesizer, SynthesizedAudio};
use crate::upload::{UploadIngestor, UploadedAudio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineReply {
    pub request_id: Uuid,
    pub transcript: Transcript,
    pub generated: GeneratedResponse,
    pub document: Document,
    pub audio: Option<SynthesizedAudio>,
}

impl PipelineReply {
    pub fn html(&self) -> String {
        self.document.to_html()
    }

    pub fn audio_base64(&self) -> Option<String> {
        self.audio.as_ref().map(SynthesizedAudio::to_base64)
    }
}

/// Text handed to the synthesizer: the generated answer without emphasis markers.
pub fn spoken_text(generated: &GeneratedResponse) -> String {
    if generated.is_blank() {
        return NO_RESPONSE.to_string();
    }
    generated.text.replace("**", "")
}

pub struct ResponsePipeline {
    ingestor: UploadIngestor,
    transcoder: Arc<dyn AudioTranscoder>,
    transcriber: Arc<dyn SpeechTranscriber>,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    on_synthesis_failure: SynthesisFailurePolicy,
}

impl ResponsePipeline {
    pub fn new(
        ingestor: UploadIngestor,
        transcoder: Arc<dyn AudioTranscoder>,
        transcriber: Arc<dyn SpeechTranscriber>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        Self {
            ingestor,
            transcoder,
            transcriber,
            generator,
            synthesizer: None,
            on_synthesis_failure: SynthesisFailurePolicy::default(),
        }
    }

    pub fn with_synthesizer(
        mut self,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        on_failure: SynthesisFailurePolicy,
    ) -> Self {
        self.synthesizer = Some(synthesizer);
        self.on_synthesis_failure = on_failure;
        self
    }

    /// Wire the production adapters. A backend whose credential is missing falls back to
    /// its placeholder with a warning.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ConfigError> {
        let ingestor = UploadIngestor::new(&cfg.scratch_dir, cfg.keep_scratch);
        let transcoder = Arc::new(FfmpegTranscoder::new(
            cfg.transcoder.ffmpeg_path.clone(),
            cfg.transcoder.sample_rate,
        ));

        let transcriber: Arc<dyn SpeechTranscriber> = match cfg.transcription_api_key() {
            Ok(key) => Arc::new(
                OpenAiSttClient::new(
                    cfg.transcription.api_url.clone(),
                    key,
                    cfg.transcription.model.clone(),
                    Duration::from_secs(cfg.transcription.timeout_secs),
                )
                .map_err(|e| ConfigError::Client(e.to_string()))?
                .with_language(cfg.transcription.language.clone()),
            ),
            Err(e) => {
                warn!(target: "voxreply::stt", "{}; using placeholder transcriber", e);
                Arc::new(PlaceholderStt::new())
            }
        };

        let generator: Arc<dyn ResponseGenerator> = match cfg.generation_api_key() {
            Ok(key) => Arc::new(
                ChatCompletionsGenerator::new(
                    cfg.generation.api_url.clone(),
                    key,
                    Duration::from_secs(cfg.generation.timeout_secs),
                )
                .map_err(|e| ConfigError::Client(e.to_string()))?
                .with_sampling(cfg.generation.temperature, cfg.generation.max_tokens),
            ),
            Err(e) => {
                warn!(target: "voxreply::generate", "{}; using placeholder generator", e);
                Arc::new(PlaceholderGenerator)
            }
        };

        let pipeline = Self::new(ingestor, transcoder, transcriber, generator);
        if !cfg.any_synthesis() {
            return Ok(pipeline);
        }

        let synthesizer: Arc<dyn SpeechSynthesizer> = match cfg.synthesis_api_key() {
            Ok(key) => Arc::new(
                OpenAiTtsClient::new(
                    cfg.synthesis.api_url.clone(),
                    key,
                    cfg.synthesis.model.clone(),
                    cfg.synthesis.voice.clone(),
                    Duration::from_secs(cfg.synthesis.timeout_secs),
                )
                .map_err(|e| ConfigError::Client(e.to_string()))?,
            ),
            Err(e) => {
                warn!(target: "voxreply::tts", "{}; using placeholder synthesizer", e);
                Arc::new(PlaceholderTts)
            }
        };
        Ok(pipeline.with_synthesizer(synthesizer, cfg.synthesis.on_failure))
    }

    /// Run every stage for one upload under `profile`.
    pub async fn run(&self, profile: &Profile, upload: UploadedAudio) -> PipelineResult<PipelineReply> {
        let scratch = self.ingestor.ingest(&upload).await.inspect_err(log_failure)?;
        let request_id = scratch.request_id();
        let span = info_span!("pipeline", %request_id, model = %profile.model);

        async move {
            let waveform = self
                .transcoder
                .transcode(&scratch)
                .await
                .inspect_err(log_failure)?;
            drop(scratch);

            let transcript = self
                .transcriber
                .transcribe(&waveform)
                .await
                .inspect_err(log_failure)?;
            drop(waveform);
            debug!(text = %transcript.text, "transcribed");

            let prompt = ChatPrompt::for_transcript(profile, &transcript);
            let generated = self
                .generator
                .generate(&prompt)
                .await
                .inspect_err(log_failure)?;
            if generated.is_blank() {
                info!("generation returned no content; answering with placeholder text");
            }
            debug!(text = %generated.text, "generated");

            let document = format_response(&generated.text);
            let audio = if profile.synthesize {
                self.synthesize(&generated).await?
            } else {
                None
            };

            info!(
                tokens = document.tokens().len(),
                audio = audio.is_some(),
                "pipeline complete"
            );
            Ok(PipelineReply {
                request_id,
                transcript,
                generated,
                document,
                audio,
            })
        }
        .instrument(span)
        .await
    }

    async fn synthesize(&self, generated: &GeneratedResponse) -> PipelineResult<Option<SynthesizedAudio>> {
        let Some(ref synthesizer) = self.synthesizer else {
            warn!("profile requests speech but no synthesizer is configured");
            return Ok(None);
        };
        match synthesizer.synthesize(&spoken_text(generated)).await {
            Ok(audio) if audio.is_empty() => Ok(None),
            Ok(audio) => Ok(Some(audio)),
            Err(e) => match self.on_synthesis_failure {
                SynthesisFailurePolicy::Degrade => {
                    warn!(error = %e, "speech synthesis failed; returning text only");
                    Ok(None)
                }
                SynthesisFailurePolicy::Fail => {
                    log_failure(&e);
                    Err(e)
                }
            },
        }
    }
}

fn log_failure(e: &PipelineError) {
    warn!(stage = ?e.stage(), error = %e, "pipeline stage failed");
}
