//! **AudioTranscoder**: uploaded container → canonical waveform (mono 16-bit PCM WAV).

use crate::error::{PipelineError, PipelineResult};
use crate::upload::ScratchFile;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Canonical waveform ready for transcription. Owns its scratch file.
#[derive(Debug)]
pub struct TranscodedAudio {
    file: ScratchFile,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Samples per channel.
    pub frames: u32,
}

impl TranscodedAudio {
    pub fn new(
        file: ScratchFile,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
        frames: u32,
    ) -> Self {
        Self {
            file,
            sample_rate,
            channels,
            bits_per_sample,
            frames,
        }
    }

    /// Read the format from an existing WAV scratch file.
    pub fn from_wav(file: ScratchFile) -> PipelineResult<Self> {
        let reader = hound::WavReader::open(file.path())
            .map_err(|e| PipelineError::Transcode(format!("unreadable WAV output: {}", e)))?;
        let spec = reader.spec();
        let frames = reader.duration();
        Ok(Self::new(
            file,
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            frames,
        ))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn request_id(&self) -> Uuid {
        self.file.request_id()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Converts a stored upload into the canonical waveform.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    async fn transcode(&self, upload: &ScratchFile) -> PipelineResult<TranscodedAudio>;
}

/// Transcoder backed by an `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    sample_rate: u32,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            sample_rate,
        }
    }

    fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-vn".into(),
            "-ac".into(),
            "1".into(),
            "-ar".into(),
            self.sample_rate.to_string(),
            "-c:a".into(),
            "pcm_s16le".into(),
            "-y".into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg", 16_000)
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn transcode(&self, upload: &ScratchFile) -> PipelineResult<TranscodedAudio> {
        let wav = upload.sibling("pcm.wav");
        let output = tokio::process::Command::new(&self.ffmpeg_path)
            .args(self.args(upload.path(), wav.path()))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PipelineError::Transcode(format!(
                    "failed to execute {} (is it installed?): {}",
                    self.ffmpeg_path, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Transcode(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let audio = tokio::task::spawn_blocking(move || TranscodedAudio::from_wav(wav))
            .await
            .map_err(|e| PipelineError::Transcode(e.to_string()))??;
        debug!(
            request_id = %audio.request_id(),
            sample_rate = audio.sample_rate,
            secs = audio.duration().as_secs_f32(),
            "audio transcoded"
        );
        Ok(audio)
    }
}
