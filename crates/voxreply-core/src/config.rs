//! Service configuration, built once at startup and passed explicitly into the pipeline.
//!
//! Precedence: env `VOXREPLY__*` (double-underscore separated, e.g. `VOXREPLY__PORT`,
//! `VOXREPLY__SYNTHESIS__ON_FAILURE`) > file at `VOXREPLY_CONFIG` (default
//! `config/voxreply.toml`, optional) > defaults.
//!
//! Credentials are never part of the file: each backend names the env var holding its key.
//!
//! | Env | Used for |
//! |-----|----------|
//! | VOXREPLY_LLM_API_KEY / OPENROUTER_API_KEY | generation (and fallback for STT/TTS) |
//! | STT_API_KEY | speech-to-text |
//! | TTS_API_KEY | text-to-speech |

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Name of the built-in profile.
pub const DEFAULT_PROFILE: &str = "interview";

const DEFAULT_PERSONA: &str = "You are speaking as a software engineer with four years of experience, \
a candidate interviewing for an AI Agent Team role. \
Respond to each question as if you are in a real interview.\n\n\
Guidelines for your answers:\n\
- Keep answers short and natural (2-4 sentences).\n\
- Speak in first person (\"I...\").\n\
- Show confidence, curiosity, and enthusiasm.\n\
- Highlight your experience in Python, AI, LLMs, LangChain, RAG, agentic workflows, and problem-solving.\n\
- Be authentic: mix professional strengths with personal qualities.\n\
- If the question is unexpected, still answer positively and relate back to your skills or growth mindset.";

const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

fn default_true() -> bool {
    true
}

/// One pipeline variant: who the model speaks as, which model, and whether to speak back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub persona: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub synthesize: bool,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Profile {
    pub fn interview() -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_string(),
            model: DEFAULT_MODEL.to_string(),
            synthesize: false,
        }
    }
}

/// What to do when speech synthesis fails for a profile that has it enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisFailurePolicy {
    /// Log and return the text-only response.
    #[default]
    Degrade,
    /// Fail the whole request.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL without trailing slash; `/chat/completions` is appended.
    pub api_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "VOXREPLY_LLM_API_KEY".to_string(),
            timeout_secs: 60,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Base URL without trailing slash; `/audio/transcriptions` is appended.
    pub api_url: String,
    pub api_key_env: String,
    pub model: String,
    pub language: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "STT_API_KEY".to_string(),
            model: "whisper-1".to_string(),
            language: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Base URL without trailing slash; `/audio/speech` is appended.
    pub api_url: String,
    pub api_key_env: String,
    pub model: String,
    pub voice: String,
    pub timeout_secs: u64,
    pub on_failure: SynthesisFailurePolicy,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "TTS_API_KEY".to_string(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            timeout_secs: 60,
            on_failure: SynthesisFailurePolicy::Degrade,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub ffmpeg_path: String,
    pub sample_rate: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            sample_rate: 16_000,
        }
    }
}

/// Presentation of the rendered document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Wrap the markup in a scrollable container that auto-scrolls to the end.
    pub scrollable: bool,
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Directory for per-request scratch files (uploads and transcoded audio).
    pub scratch_dir: String,
    /// Keep scratch files after the request instead of deleting them.
    #[serde(default)]
    pub keep_scratch: bool,
    /// Allow any origin, method, and header.
    #[serde(default = "default_true")]
    pub cors_permissive: bool,
    pub active_profile: String,
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub shell: ShellConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(DEFAULT_PROFILE.to_string(), Profile::interview());
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            scratch_dir: "uploads".to_string(),
            keep_scratch: false,
            cors_permissive: true,
            active_profile: DEFAULT_PROFILE.to_string(),
            profiles,
            generation: GenerationConfig::default(),
            transcription: TranscriptionConfig::default(),
            synthesis: SynthesisConfig::default(),
            transcoder: TranscoderConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `VOXREPLY_CONFIG` (or `config/voxreply`) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("VOXREPLY_CONFIG").unwrap_or_else(|_| "config/voxreply".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load with an explicit file path. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let built = config::Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8000_i64)?
            .set_default("scratch_dir", "uploads")?
            .set_default("active_profile", DEFAULT_PROFILE)?
            .add_source(config::File::with_name(&path.to_string_lossy()).required(false))
            .add_source(config::Environment::with_prefix("VOXREPLY").separator("__"))
            .build()?;

        let mut cfg: AppConfig = built.try_deserialize()?;
        cfg.profiles
            .entry(DEFAULT_PROFILE.to_string())
            .or_insert_with(Profile::interview);
        cfg.profile(&cfg.active_profile)?;
        Ok(cfg)
    }

    /// Look up a named profile.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    pub fn active(&self) -> Result<&Profile, ConfigError> {
        self.profile(&self.active_profile)
    }

    /// True when any configured profile speaks its answers back.
    pub fn any_synthesis(&self) -> bool {
        self.profiles.values().any(|p| p.synthesize)
    }

    /// Generation key: the configured env var, then `OPENROUTER_API_KEY`.
    pub fn generation_api_key(&self) -> Result<String, ConfigError> {
        env_opt_string(&self.generation.api_key_env)
            .or_else(|| env_opt_string("OPENROUTER_API_KEY"))
            .ok_or_else(|| ConfigError::MissingCredential(self.generation.api_key_env.clone()))
    }

    /// STT key: the configured env var, then the generation key.
    pub fn transcription_api_key(&self) -> Result<String, ConfigError> {
        match env_opt_string(&self.transcription.api_key_env) {
            Some(key) => Ok(key),
            None => self.generation_api_key().map_err(|_| {
                ConfigError::MissingCredential(self.transcription.api_key_env.clone())
            }),
        }
    }

    /// TTS key: the configured env var, then the generation key.
    pub fn synthesis_api_key(&self) -> Result<String, ConfigError> {
        match env_opt_string(&self.synthesis.api_key_env) {
            Some(key) => Ok(key),
            None => self
                .generation_api_key()
                .map_err(|_| ConfigError::MissingCredential(self.synthesis.api_key_env.clone())),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_include_interview_profile() {
        let cfg = AppConfig::default();
        let profile = cfg.active().unwrap();
        assert_eq!(cfg.active_profile, DEFAULT_PROFILE);
        assert!(profile.persona.contains("interview"));
        assert!(!profile.synthesize);
        assert_eq!(cfg.synthesis.on_failure, SynthesisFailurePolicy::Degrade);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8000");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from(&dir.path().join("absent")).unwrap();
        assert!(cfg.profiles.contains_key(DEFAULT_PROFILE));
        assert_eq!(cfg.transcoder.sample_rate, 16_000);
    }

    #[test]
    fn file_adds_profiles_and_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voxreply.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
active_profile = "tutor"
scratch_dir = "/tmp/voxreply-scratch"

[profiles.tutor]
persona = "You are a patient tutor."
model = "openai/gpt-4o-mini"
synthesize = true

[synthesis]
voice = "nova"
on_failure = "fail"

[shell]
scrollable = true
"#
        )
        .unwrap();
        drop(f);

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.active_profile, "tutor");
        let tutor = cfg.active().unwrap();
        assert_eq!(tutor.model, "openai/gpt-4o-mini");
        assert!(tutor.synthesize);
        assert!(cfg.any_synthesis());
        assert!(cfg.profiles.contains_key(DEFAULT_PROFILE));
        assert_eq!(cfg.synthesis.voice, "nova");
        assert_eq!(cfg.synthesis.model, "tts-1");
        assert_eq!(cfg.synthesis.on_failure, SynthesisFailurePolicy::Fail);
        assert!(cfg.shell.scrollable);
        assert_eq!(cfg.scratch_dir, "/tmp/voxreply-scratch");
    }

    #[test]
    fn unknown_active_profile_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "active_profile = \"missing\"\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(ref p) if p == "missing"));
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let mut cfg = AppConfig::default();
        cfg.generation.api_key_env = "VOXREPLY_TEST_UNSET_KEY_9F1C".to_string();
        if std::env::var("OPENROUTER_API_KEY").is_err() {
            let err = cfg.generation_api_key().unwrap_err();
            assert!(err.to_string().contains("VOXREPLY_TEST_UNSET_KEY_9F1C"));
        }
    }
}
