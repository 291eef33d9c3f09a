//! HTTP API server implementation

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Json, Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::core::adapter::TranslationAdapter;
use crate::core::capability::TranslationCapability;
use crate::core::client::{AsyncTranslator, TranslationBackend};
use crate::core::config::ProcessorConfig;
use crate::core::errors::TranslationError;
use crate::core::models::{FailurePolicy, LanguagePair};
use crate::document::CellValue;
use crate::processors::DocumentProcessor;

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

const X_ELAPSED_MS: HeaderName = HeaderName::from_static("x-elapsed-ms");
const X_TRANSLATED_CELLS: HeaderName = HeaderName::from_static("x-translated-cells");
const X_FAILED_CELLS: HeaderName = HeaderName::from_static("x-failed-cells");

/// Application state
#[derive(Clone)]
pub struct AppState {
    processor: DocumentProcessor,
}

impl AppState {
    pub fn new(processor: DocumentProcessor) -> Self {
        Self { processor }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    capability: String,
}

/// Text list translation request
#[derive(Deserialize)]
pub struct TranslateRequest {
    pub text_list: Vec<String>,
}

/// Text list translation response
#[derive(Serialize)]
pub struct TranslateResponse {
    pub translations: Vec<TranslationItem>,
}

#[derive(Serialize)]
pub struct TranslationItem {
    pub text: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub code: String,
}

/// A pipeline error rendered as a JSON response
pub struct ApiError(TranslationError);

impl From<TranslationError> for ApiError {
    fn from(err: TranslationError) -> Self {
        ApiError(err)
    }
}

/// HTTP status for a pipeline error
pub fn status_for(err: &TranslationError) -> StatusCode {
    match err {
        TranslationError::UnsupportedShape { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        TranslationError::Deserialize { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TranslationError::CapabilityUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        TranslationError::TranslationFailure { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: ErrorDetail {
                message: self.0.to_string(),
                code: self.0.code().to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

fn invalid_request(message: &str) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail {
            message: message.to_string(),
            code: "invalid_request".to_string(),
        },
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// `Content-Disposition` for a download, RFC 5987 encoded when the name is
/// not plain ASCII
pub fn content_disposition(file_name: &str) -> String {
    let plain = file_name
        .bytes()
        .all(|b| (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ');
    if plain {
        return format!("attachment; filename=\"{}\"", file_name);
    }

    let mut encoded = String::with_capacity(file_name.len() * 3);
    for b in file_name.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{:02X}", b));
        }
    }
    format!("attachment; filename*=UTF-8''{}", encoded)
}

/// Health check handler
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: crate::NAME.to_string(),
        version: crate::VERSION.to_string(),
        capability: state.processor.capability().status().await.to_string(),
    })
}

/// Document translation handler: raw bytes in, translated bytes out
async fn translate_document(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    info!("Received {} ({} bytes)", file_name, body.len());

    let translated = state.processor.translate_bytes(&file_name, &body).await?;

    let disposition = HeaderValue::from_str(&content_disposition(&translated.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(translated.media_type)),
        (header::CONTENT_DISPOSITION, disposition),
        (X_ELAPSED_MS, HeaderValue::from(translated.elapsed_ms() as u64)),
        (X_TRANSLATED_CELLS, HeaderValue::from(translated.report.translated)),
        (X_FAILED_CELLS, HeaderValue::from(translated.report.failed)),
    ];

    Ok((StatusCode::OK, headers, translated.bytes).into_response())
}

/// Text list translation handler
async fn translate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TranslateRequest>,
) -> Result<Response, ApiError> {
    if payload.text_list.is_empty() {
        return Ok(invalid_request("text_list cannot be empty"));
    }

    let backend = state.processor.capability().backend().await?;
    let adapter = TranslationAdapter::new(backend, LanguagePair::zh_en());
    let policy = state.processor.config().failure_policy;

    let mut translations = Vec::with_capacity(payload.text_list.len());
    for text in payload.text_list {
        let value = CellValue::String(text);
        let translated = match adapter.translate_value(&value).await {
            Ok(translated) => translated,
            Err(e) if policy == FailurePolicy::KeepSource => {
                warn!("Keeping source text: {}", e);
                value
            }
            Err(e) => return Err(e.into()),
        };
        translations.push(TranslationItem {
            text: translated.display().unwrap_or_default(),
        });
    }

    Ok(Json(TranslateResponse { translations }).into_response())
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/documents/:file_name", post(translate_document))
        .route("/translate", post(translate))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Run the HTTP server. The backend is installed in the background; requests
/// arriving before it is ready get `503`.
pub async fn run_server(
    host: String,
    port: u16,
    translator: AsyncTranslator,
    config: ProcessorConfig,
) -> anyhow::Result<()> {
    let capability = TranslationCapability::new();
    let processor = DocumentProcessor::new(capability.clone(), config);
    let pair = LanguagePair::zh_en();

    let backend: Arc<dyn TranslationBackend> = Arc::new(translator);
    tokio::spawn(async move {
        if let Err(e) = capability.install(backend, &pair).await {
            warn!("Serving without a translation backend: {}", e);
        }
    });

    let app = router(AppState::new(processor));

    // Bind address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
