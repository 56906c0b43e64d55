//! HTTP surface: routes, multipart intake, and the JSON envelope.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use voxreply_core::{wrap_scrollable, AppConfig, PipelineError, ResponsePipeline, UploadedAudio};

/// Multipart field carrying the recording.
const AUDIO_FIELD: &str = "audio";
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<ResponsePipeline>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_base64: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    MissingAudio,
    UnknownProfile(String),
    Pipeline(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingAudio => StatusCode::BAD_REQUEST,
            ApiError::UnknownProfile(_) => StatusCode::NOT_FOUND,
            ApiError::Pipeline(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::MissingAudio => "Missing audio upload".to_string(),
            ApiError::UnknownProfile(name) => format!("Unknown profile: {}", name),
            ApiError::Pipeline(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, "{}", self.message());
        }
        let body = ChatResponse {
            response: self.message(),
            audio_base64: None,
        };
        (status, Json(body)).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors_permissive = state.config.cors_permissive;
    let app = Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/chat/:profile", post(chat_with_profile))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);
    if cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn health() -> &'static str {
    "OK"
}

/// POST /chat: run the active profile.
async fn chat(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let name = state.config.active_profile.clone();
    respond(&state, &name, multipart).await
}

/// POST /chat/:profile
async fn chat_with_profile(
    State(state): State<AppState>,
    Path(profile): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    respond(&state, &profile, multipart).await
}

async fn respond(
    state: &AppState,
    profile_name: &str,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let profile = state
        .config
        .profile(profile_name)
        .map_err(|_| ApiError::UnknownProfile(profile_name.to_string()))?;
    let upload = read_audio(multipart).await?;
    tracing::info!(
        profile = profile_name,
        bytes = upload.bytes.len(),
        "chat request"
    );

    let reply = state.pipeline.run(profile, upload).await?;
    let html = reply.html();
    let response = if state.config.shell.scrollable {
        wrap_scrollable(&html)
    } else {
        html
    };
    Ok(Json(ChatResponse {
        response,
        audio_base64: reply.audio_base64(),
    }))
}

/// Pull the `audio` field out of the form; other fields are skipped.
async fn read_audio(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadedAudio, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("multipart rejected: {}", e);
        ApiError::MissingAudio
    })?;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(ApiError::MissingAudio),
            Err(e) => {
                tracing::debug!("multipart read failed: {}", e);
                return Err(ApiError::MissingAudio);
            }
        };
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| {
            tracing::debug!("audio field read failed: {}", e);
            ApiError::MissingAudio
        })?;

        let mut upload = UploadedAudio::new(bytes.to_vec());
        if let Some(name) = filename {
            upload = upload.with_filename(name);
        }
        if let Some(ct) = content_type {
            upload = upload.with_content_type(ct);
        }
        return Ok(upload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use voxreply_core::{
        AudioTranscoder, ChatPrompt, GeneratedResponse, PipelineResult, Profile,
        ResponseGenerator, ScratchFile, SpeechSynthesizer, SpeechTranscriber,
        SynthesisFailurePolicy, SynthesizedAudio, TranscodedAudio, Transcript, UploadIngestor,
    };

    const BOUNDARY: &str = "voxreply-test-boundary";

    struct StubTranscoder;

    #[async_trait]
    impl AudioTranscoder for StubTranscoder {
        async fn transcode(&self, upload: &ScratchFile) -> PipelineResult<TranscodedAudio> {
            Ok(TranscodedAudio::new(upload.sibling("pcm.wav"), 16_000, 1, 16, 16_000))
        }
    }

    #[derive(Clone, Copy)]
    enum Hearing {
        Question,
        Silence,
        Outage,
    }

    struct StubStt(Hearing);

    #[async_trait]
    impl SpeechTranscriber for StubStt {
        async fn transcribe(&self, _audio: &TranscodedAudio) -> PipelineResult<Transcript> {
            match self.0 {
                Hearing::Question => Ok(Transcript::new("What are your strengths?")),
                Hearing::Silence => Err(PipelineError::UnrecognizedSpeech),
                Hearing::Outage => Err(PipelineError::RecognitionService("timed out".into())),
            }
        }
    }

    struct StubGenerator;

    #[async_trait]
    impl ResponseGenerator for StubGenerator {
        async fn generate(&self, prompt: &ChatPrompt) -> PipelineResult<GeneratedResponse> {
            Ok(GeneratedResponse {
                text: "**Curiosity** and focus.\n- Rust\n- Python".into(),
                model: prompt.model.clone(),
            })
        }
    }

    struct StubTts;

    #[async_trait]
    impl SpeechSynthesizer for StubTts {
        async fn synthesize(&self, _text: &str) -> PipelineResult<SynthesizedAudio> {
            Ok(SynthesizedAudio {
                bytes: vec![1, 2, 3],
                mime_type: "audio/mpeg".into(),
            })
        }
    }

    fn app(dir: &std::path::Path, hearing: Hearing, scrollable: bool) -> Router {
        let mut config = AppConfig::default();
        config.scratch_dir = dir.to_string_lossy().into_owned();
        config.shell.scrollable = scrollable;
        config.profiles.insert(
            "spoken".into(),
            Profile {
                persona: "You answer aloud.".into(),
                model: "test/model".into(),
                synthesize: true,
            },
        );
        let pipeline = ResponsePipeline::new(
            UploadIngestor::new(dir, false),
            Arc::new(StubTranscoder),
            Arc::new(StubStt(hearing)),
            Arc::new(StubGenerator),
        )
        .with_synthesizer(Arc::new(StubTts), SynthesisFailurePolicy::Degrade);
        build_router(AppState {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        })
    }

    fn multipart_request(uri: &str, field: &str) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"audio.webm\"\r\n",
                field
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: audio/webm\r\n\r\n");
        body.extend_from_slice(&[0x1a, 0x45, 0xdf, 0xa3, 0x00, 0x01]);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = app(dir.path(), Hearing::Question, false).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn chat_returns_formatted_markup() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(dir.path(), Hearing::Question, false)
            .oneshot(multipart_request("/chat", "audio"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = json_body(res).await;
        assert_eq!(
            json["response"],
            "<p><b>Curiosity</b> and focus.</p>\n<ul>\n<li>Rust</li>\n<li>Python</li>\n</ul>"
        );
        assert!(json.get("audio_base64").is_none());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn speaking_profile_includes_audio() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(dir.path(), Hearing::Question, false)
            .oneshot(multipart_request("/chat/spoken", "audio"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = json_body(res).await;
        assert_eq!(json["audio_base64"], "AQID");
        assert!(json["response"].as_str().unwrap().starts_with("<p><b>Curiosity</b>"));
    }

    #[tokio::test]
    async fn scrollable_shell_wraps_markup() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(dir.path(), Hearing::Question, true)
            .oneshot(multipart_request("/chat", "audio"))
            .await
            .unwrap();
        let json = json_body(res).await;
        let html = json["response"].as_str().unwrap();
        assert!(html.contains("scrollable-response"));
        assert!(html.contains("<li>Rust</li>"));
    }

    #[tokio::test]
    async fn unrecognized_speech_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(dir.path(), Hearing::Silence, false)
            .oneshot(multipart_request("/chat", "audio"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["response"], "Could not understand audio");
    }

    #[tokio::test]
    async fn recognition_outage_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(dir.path(), Hearing::Outage, false)
            .oneshot(multipart_request("/chat", "audio"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(res).await["response"],
            "Could not request results from speech recognition service; timed out"
        );
    }

    #[tokio::test]
    async fn wrong_field_name_is_missing_audio() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(dir.path(), Hearing::Question, false)
            .oneshot(multipart_request("/chat", "file"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["response"], "Missing audio upload");
    }

    #[tokio::test]
    async fn non_multipart_body_is_missing_audio() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let res = app(dir.path(), Hearing::Question, false).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["response"], "Missing audio upload");
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(dir.path(), Hearing::Question, false)
            .oneshot(multipart_request("/chat/nobody", "audio"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(res).await["response"], "Unknown profile: nobody");
    }
}
