use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::audio::{encode_wav, MODEL_SAMPLE_RATE};
use crate::config::Config;
use crate::enhancement::SpeechEnhancer;
use crate::pipeline::{prepare_upload, run_enhancement, PipelineError, ProcessedAudio};

use super::page;

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub enhancer: Arc<Mutex<Box<dyn SpeechEnhancer>>>,
    pub model_description: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(enhancer: Box<dyn SpeechEnhancer>, max_upload_bytes: usize) -> Self {
        let model_description = enhancer.describe();
        Self {
            enhancer: Arc::new(Mutex::new(enhancer)),
            model_description,
            max_upload_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Error returned from a handler, rendered as JSON
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        if err.is_rejection() {
            Self::bad_request(err.to_string())
        } else {
            error!("Enhancement failed: {}", err);
            Self::internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// The `file` field of a multipart upload
struct UploadedAudio {
    filename: String,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadedAudio, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError {
        status: e.status(),
        message: format!("invalid multipart: {e}"),
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        let bytes = field.bytes().await.map_err(|e| ApiError {
            status: e.status(),
            message: format!("file read error: {e}"),
        })?;
        return Ok(UploadedAudio {
            filename,
            bytes: bytes.to_vec(),
        });
    }

    Err(ApiError::bad_request("No file uploaded"))
}

/// Validate, decode and enhance one upload off the async runtime
async fn run_pipeline(state: &AppState, upload: UploadedAudio) -> Result<ProcessedAudio, ApiError> {
    info!(
        "Processing upload {:?} ({} bytes)",
        upload.filename,
        upload.bytes.len()
    );

    let enhancer = state.enhancer.clone();
    let span = tracing::Span::current();
    let result = tokio::task::spawn_blocking(move || -> Result<ProcessedAudio, PipelineError> {
        let _guard = span.enter();
        let signal = prepare_upload(&upload.filename, &upload.bytes)?;
        // Decoding and checks happen before the model lock is taken
        let mut enhancer = enhancer.blocking_lock();
        run_enhancement(&mut **enhancer, signal)
    })
    .await
    .map_err(|e| ApiError::internal(format!("task join error: {e}")))?;

    Ok(result?)
}

async fn index() -> Html<String> {
    Html(page::upload_form(None))
}

/// Browser form submission: renders the result page or the form with a warning
async fn enhance_form(State(state): State<AppState>, multipart: Multipart) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("enhance_form", %request_id);

    async move {
        let processed = match read_upload(multipart).await {
            Ok(upload) => run_pipeline(&state, upload).await,
            Err(e) => Err(e),
        };

        match processed.and_then(|p| {
            page::result_page(&p).map_err(|e| ApiError::internal(e.to_string()))
        }) {
            Ok(html) => Html(html).into_response(),
            Err(e) => (e.status, Html(page::upload_form(Some(&e.message)))).into_response(),
        }
    }
    .instrument(span)
    .await
}

/// API upload: responds with the enhanced WAV as an attachment
async fn enhance_api(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("enhance_api", %request_id);

    async move {
        let upload = read_upload(multipart).await?;
        let processed = run_pipeline(&state, upload).await?;
        let wav = encode_wav(&processed.enhanced, processed.sample_rate)
            .map_err(|e| ApiError::internal(e.to_string()))?;

        let disposition = format!("attachment; filename=\"{}\"", page::DOWNLOAD_FILENAME);
        Ok::<Response, ApiError>((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static(page::WAV_MIME)),
                (
                    header::CONTENT_DISPOSITION,
                    HeaderValue::from_str(&disposition)
                        .map_err(|e| ApiError::internal(e.to_string()))?,
                ),
            ],
            wav,
        )
            .into_response())
    }
    .instrument(span)
    .await
}

/// Simple health endpoint for monitoring
async fn health(State(state): State<AppState>) -> Json<Value> {
    // An inference in flight holds the lock; report busy rather than wait
    let (ready, busy) = match state.enhancer.try_lock() {
        Ok(enhancer) => (enhancer.is_ready(), false),
        Err(_) => (true, true),
    };
    Json(serde_json::json!({
        "healthy": ready,
        "busy": busy,
        "model": state.model_description,
        "sample_rate": MODEL_SAMPLE_RATE,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Build the router with all routes and layers
pub fn router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/enhance", post(enhance_form))
        .route("/api/enhance", post(enhance_api))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind and serve until Ctrl+C
pub async fn serve(config: &Config, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid host/port {}: {e}", config.bind_addr()))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {e}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl+C, shutting down...");
        })
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))
}
