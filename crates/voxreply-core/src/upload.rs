//! **UploadIngestor**: persist uploaded audio under a per-request scratch name.
//!
//! Scratch names come from a generated UUID, never from the client's filename; only a
//! sanitized extension is carried over so the transcoder can sniff the container.

use crate::error::{PipelineError, PipelineResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Raw audio as received from the client.
#[derive(Debug, Clone, Default)]
pub struct UploadedAudio {
    pub bytes: Vec<u8>,
    /// Filename declared by the client (untrusted).
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl UploadedAudio {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Default::default()
        }
    }

    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Extension to use for the scratch file: the declared one if it is a short
    /// alphanumeric token, else one derived from the content type, else `bin`.
    pub fn extension(&self) -> String {
        let from_name = self
            .filename
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));
        if let Some(ext) = from_name {
            return ext;
        }
        let mime = self
            .content_type
            .as_deref()
            .map(|c| c.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();
        match mime.as_str() {
            "audio/webm" | "video/webm" => "webm",
            "audio/ogg" | "audio/opus" => "ogg",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
            "audio/flac" | "audio/x-flac" => "flac",
            _ => "bin",
        }
        .to_string()
    }
}

/// A per-request file in the scratch directory. Removed on drop unless kept.
#[derive(Debug)]
pub struct ScratchFile {
    request_id: Uuid,
    path: PathBuf,
    keep: bool,
}

impl ScratchFile {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Another scratch file for the same request, e.g. the transcoded waveform.
    pub fn sibling(&self, extension: &str) -> ScratchFile {
        let file_name = format!("{}.{}", self.request_id, extension);
        let path = match self.path.parent() {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        };
        ScratchFile {
            request_id: self.request_id,
            path,
            keep: self.keep,
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "scratch file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "scratch cleanup failed"),
        }
    }
}

/// Stores uploads under `<dir>/<uuid>.<ext>`.
#[derive(Debug, Clone)]
pub struct UploadIngestor {
    dir: PathBuf,
    keep: bool,
}

impl UploadIngestor {
    pub fn new(dir: impl Into<PathBuf>, keep: bool) -> Self {
        Self {
            dir: dir.into(),
            keep,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the upload to a fresh scratch file.
    pub async fn ingest(&self, upload: &UploadedAudio) -> PipelineResult<ScratchFile> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PipelineError::Upload(format!("{}: {}", self.dir.display(), e)))?;

        let request_id = Uuid::new_v4();
        let path = self
            .dir
            .join(format!("{}.{}", request_id, upload.extension()));
        let scratch = ScratchFile {
            request_id,
            path,
            keep: self.keep,
        };
        tokio::fs::write(scratch.path(), &upload.bytes)
            .await
            .map_err(|e| PipelineError::Upload(e.to_string()))?;

        debug!(
            %request_id,
            bytes = upload.bytes.len(),
            declared = upload.filename.as_deref().unwrap_or(""),
            path = %scratch.path().display(),
            "upload stored"
        );
        Ok(scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_sane_declared_name() {
        let up = UploadedAudio::new(vec![]).with_filename("recording.WEBM");
        assert_eq!(up.extension(), "webm");

        let up = UploadedAudio::new(vec![])
            .with_filename("../../etc/passwd")
            .with_content_type("audio/ogg; codecs=opus");
        assert_eq!(up.extension(), "ogg");

        let up = UploadedAudio::new(vec![]).with_filename("clip.we/bm");
        assert_eq!(up.extension(), "bin");
    }

    #[tokio::test]
    async fn same_client_name_gets_distinct_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = UploadIngestor::new(dir.path(), false);
        let up = UploadedAudio::new(b"abc".to_vec()).with_filename("audio.webm");

        let a = ingestor.ingest(&up).await.unwrap();
        let b = ingestor.ingest(&up).await.unwrap();
        assert_ne!(a.request_id(), b.request_id());
        assert_ne!(a.path(), b.path());
        assert_eq!(std::fs::read(a.path()).unwrap(), b"abc");
        assert!(a.path().starts_with(dir.path()));
    }

    #[tokio::test]
    async fn scratch_is_removed_on_drop_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let up = UploadedAudio::new(b"x".to_vec());

        let dropped = UploadIngestor::new(dir.path(), false).ingest(&up).await.unwrap();
        let path = dropped.path().to_path_buf();
        drop(dropped);
        assert!(!path.exists());

        let kept = UploadIngestor::new(dir.path(), true).ingest(&up).await.unwrap();
        let path = kept.path().to_path_buf();
        drop(kept);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn sibling_shares_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = UploadIngestor::new(dir.path(), false)
            .ingest(&UploadedAudio::new(vec![1]))
            .await
            .unwrap();
        let wav = scratch.sibling("wav");
        assert_eq!(wav.request_id(), scratch.request_id());
        assert_eq!(wav.path().parent(), scratch.path().parent());
        assert_eq!(wav.path().extension().unwrap(), "wav");
    }
}
