use crate::messages::{DEFAULT_PROMPT, InferenceMode, InferenceRequest};
use crate::relay::{RelayClient, RelayError};
use crate::storage::{self, BlobStore, StorageError};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const FALLBACK_FILENAME: &str = "upload.mp4";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("file is required")]
    MissingFile,

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            GatewayError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        log::error!("Upload and processing failed: {}", self);
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Shared state of the gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn BlobStore>,
    pub relay: RelayClient,
}

/// Builds the router of the upload gateway.
///
/// Both upload routes take a multipart form with a `file` part and optional
/// `prompt` and `mode` parts, store the file and hand its signed URL to the
/// inference service. Request bodies up to `max_upload_bytes` are accepted.
pub fn router(state: GatewayState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(|| async { "Welcome to Infernum!" }))
        .route("/upload-video", post(post_upload_video))
        .route("/process-video", post(post_process_video))
        .route("/test-timeline", get(get_test_timeline))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

struct VideoUpload {
    filename: String,
    content_type: Option<String>,
    data: Vec<u8>,
    prompt: String,
    mode: InferenceMode,
}

async fn read_upload(mut multipart: Multipart) -> Result<VideoUpload, GatewayError> {
    let mut file = None;
    let mut prompt = None;
    let mut mode = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .unwrap_or(FALLBACK_FILENAME)
                    .to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?.to_vec();
                file = Some((filename, content_type, data));
            }
            Some("prompt") => prompt = Some(field.text().await?),
            Some("mode") => mode = Some(field.text().await?),
            other => log::debug!("Ignoring form field {:?}", other),
        }
    }

    let (filename, content_type, data) = file.ok_or(GatewayError::MissingFile)?;

    Ok(VideoUpload {
        filename,
        content_type,
        data,
        prompt: prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        mode: mode.map(InferenceMode::from).unwrap_or_default(),
    })
}

/// Stores the upload and runs it through the inference service.
///
/// Returns the signed URL of the stored video and the service's answer.
async fn store_and_relay(
    state: &GatewayState,
    upload: VideoUpload,
) -> Result<(String, Value), GatewayError> {
    log::info!("Filename: {}", upload.filename);
    log::info!("Content type: {:?}", upload.content_type);
    log::info!("Mode: {}", upload.mode.as_str());
    log::info!("Prompt: {}", upload.prompt);
    log::info!(
        "Video size: {:.2} MB",
        upload.data.len() as f64 / (1024.0 * 1024.0)
    );

    log::info!("Uploading to storage bucket...");
    let stored = storage::upload_video(state.store.as_ref(), upload.data, &upload.filename).await?;
    log::info!("Video stored as {}", stored.key);

    log::info!("Calling inference service...");
    let result = state
        .relay
        .predict(&InferenceRequest::new(
            stored.url.as_str(),
            upload.prompt,
            upload.mode,
        ))
        .await?;
    log_result_shape(&result);

    Ok((stored.url, result))
}

fn log_result_shape(result: &Value) {
    if let Some(frames) = result.get("frames").and_then(Value::as_array) {
        log::info!("Received {} frame descriptions", frames.len());
    } else if result.get("description").is_some() {
        log::info!("Received summary description");
    } else if let Some(error) = result.get("error") {
        log::error!("Model returned error: {}", error);
    } else {
        let keys: Vec<_> = result
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        log::warn!("Unexpected response format: {:?}", keys);
    }
}

async fn post_upload_video(
    State(state): State<GatewayState>,
    multipart: Multipart,
) -> Result<Json<Value>, GatewayError> {
    log::info!("Video upload started");
    let upload = read_upload(multipart).await?;
    let filename = upload.filename.clone();

    let (video_url, result) = store_and_relay(&state, upload).await?;

    Ok(Json(json!({
        "video_url": video_url,
        "filename": filename,
        "result": result,
    })))
}

async fn post_process_video(
    State(state): State<GatewayState>,
    multipart: Multipart,
) -> Result<Json<Value>, GatewayError> {
    log::info!("Video processing started");
    let upload = read_upload(multipart).await?;

    let (video_url, result) = store_and_relay(&state, upload).await?;

    Ok(Json(json!({
        "video_url": video_url,
        "result": result,
    })))
}

// canned upload response for front-end work, no storage or inference involved
async fn get_test_timeline() -> Json<Value> {
    const SCENES: [&str; 10] = [
        "A person stands in front of a whiteboard holding a marker.",
        "The instructor writes a title at the top of the board.",
        "A diagram with boxes and arrows is drawn on the board.",
        "The instructor points at the first box of the diagram.",
        "A short code example is written below the diagram.",
        "The instructor gestures towards the audience while explaining.",
        "A new section heading is added on the right side of the board.",
        "Annotations and arrows are added next to the code example.",
        "A comparison table with two columns is drawn.",
        "The instructor points at the summary written in the corner.",
    ];

    let frames: Vec<Value> = SCENES
        .iter()
        .enumerate()
        .map(|(i, description)| {
            let frame_number = i * 9;
            json!({
                "timestamp": (frame_number as f64 / 30.0 * 10.0).round() / 10.0,
                "frame_number": frame_number,
                "description": description,
            })
        })
        .collect();

    Json(json!({
        "video_url": "https://example.com/test-video.mp4",
        "filename": "test_video.mp4",
        "result": { "frames": frames },
    }))
}
