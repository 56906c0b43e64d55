//! Error types for the voxreply pipeline

use thiserror::Error;

/// Result type alias for pipeline stages
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Stage failures. Each variant maps 1:1 to a caller-visible response.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to store upload: {0}")]
    Upload(String),

    #[error("Failed to convert audio: {0}")]
    Transcode(String),

    #[error("Could not understand audio")]
    UnrecognizedSpeech,

    #[error("Could not request results from speech recognition service; {0}")]
    RecognitionService(String),

    #[error("Response generation failed: {0}")]
    Generation(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),
}

/// Which pipeline stage produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Transcode,
    Transcribe,
    Generate,
    Synthesize,
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Upload(_) => Stage::Upload,
            PipelineError::Transcode(_) => Stage::Transcode,
            PipelineError::UnrecognizedSpeech | PipelineError::RecognitionService(_) => {
                Stage::Transcribe
            }
            PipelineError::Generation(_) => Stage::Generate,
            PipelineError::Synthesis(_) => Stage::Synthesize,
        }
    }

    /// True when the failure is attributable to the uploaded audio rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::UnrecognizedSpeech)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Upload(err.to_string())
    }
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Missing credential: set {0}")]
    MissingCredential(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_response_text() {
        assert_eq!(
            PipelineError::UnrecognizedSpeech.to_string(),
            "Could not understand audio"
        );
        assert_eq!(
            PipelineError::RecognitionService("quota exceeded".into()).to_string(),
            "Could not request results from speech recognition service; quota exceeded"
        );
        assert_eq!(
            PipelineError::Transcode("invalid data".into()).to_string(),
            "Failed to convert audio: invalid data"
        );
    }

    #[test]
    fn only_unrecognized_speech_is_client_error() {
        assert!(PipelineError::UnrecognizedSpeech.is_client_error());
        assert!(!PipelineError::Transcode(String::new()).is_client_error());
        assert!(!PipelineError::Generation(String::new()).is_client_error());
        assert_eq!(
            PipelineError::RecognitionService(String::new()).stage(),
            Stage::Transcribe
        );
    }
}
