//! HTTP API server.
//!
//! Exposes the PDF → summary → diagram pipeline over a JSON/multipart HTTP
//! API for browser frontends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service status and version |
//! | `POST` | `/api/generate-diagram` | Upload a PDF, receive the rendered PNG (or a degradation JSON) |
//! | `POST` | `/api/generate-summary` | Upload a PDF, receive the summary JSON only |
//! | `POST` | `/api/generate-diagram-from-summary` | SSE progress stream ending in a base64 image |
//! | `GET`  | `/api/diagrams` | Merged S3/local diagram listing |
//! | `GET`  | `/api/diagram-file/{filename}` | Serve a locally stored diagram |
//! | `GET`  | `/api/s3-diagram/{filename}` | Serve a mirrored diagram from S3 |
//! | `GET`  | `/api/diagram/{request_id}` | Legacy lookup by request id |
//!
//! # Error Contract
//!
//! Error responses carry a machine-readable code and a human message:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Only PDF files are supported" } }
//! ```
//!
//! A pipeline run whose summary succeeds but whose diagram does not is NOT
//! an error: `/api/generate-diagram` answers 200 with a degradation JSON so
//! clients still get the summary.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the expected caller is a
//! browser frontend on a different origin.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::naming::{self, DiagramRequest, GENERATED_SUBDIR};
use crate::normalize;
use crate::pipeline::{self, TempUpload};
use crate::progress::{ProgressEvent, ProgressReporter, StderrProgress};
use crate::store::{ArtifactStore, S3Mirror, StoredObject};
use crate::summarize::{self, SummaryType};

/// Uploads above this size are rejected by the extractor anyway; bound the
/// body so a runaway client cannot exhaust memory first.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    mirror: Option<Arc<dyn ArtifactStore>>,
}

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(config: Arc<Config>, mirror: Option<Arc<dyn ArtifactStore>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_status))
        .route("/api/generate-diagram", post(handle_generate_diagram))
        .route("/api/generate-summary", post(handle_generate_summary))
        .route(
            "/api/generate-diagram-from-summary",
            post(handle_diagram_from_summary),
        )
        .route("/api/diagrams", get(handle_list_diagrams))
        .route("/api/diagram-file/{filename}", get(handle_diagram_file))
        .route("/api/s3-diagram/{filename}", get(handle_s3_diagram))
        .route("/api/diagram/{request_id}", get(handle_diagram_by_request))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(AppState { config, mirror })
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let mirror: Option<Arc<dyn ArtifactStore>> = match &config.mirror {
        Some(mirror_config) => match S3Mirror::new(mirror_config.clone()) {
            Ok(m) => {
                println!("Mirroring diagrams to {}", m.location());
                Some(Arc::new(m))
            }
            Err(e) => {
                eprintln!("S3 mirror disabled: {:#}", e);
                None
            }
        },
        None => None,
    };

    let app = router(config, mirror);

    println!("Diagram server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET / ============

#[derive(Serialize)]
struct StatusResponse {
    service: String,
    message: String,
    status: String,
    version: String,
    diagram_generation: String,
}

/// Service status. Reports whether the diagram agent launcher is currently
/// resolvable so frontends can surface "summary only" mode up front.
async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let diagram_generation =
        if crate::agent::find_launcher(&state.config.agent.launcher).is_some() {
            "available"
        } else {
            "unavailable"
        };
    Json(StatusResponse {
        service: "archdiagram".to_string(),
        message: "PDF to architecture-diagram pipeline".to_string(),
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        diagram_generation: diagram_generation.to_string(),
    })
}

// ============ Upload handling ============

/// Parsed `POST /api/generate-diagram` form: the uploaded PDF plus optional
/// per-request summarizer overrides.
struct DiagramForm {
    filename: String,
    bytes: Vec<u8>,
    aws_region: Option<String>,
    bedrock_model_id: Option<String>,
}

/// Pull the uploaded file and optional override fields out of a multipart
/// form. The filename must end in `.pdf` (case-insensitive).
async fn read_diagram_form(multipart: &mut Multipart) -> Result<DiagramForm, AppError> {
    let mut filename = None;
    let mut bytes = None;
    let mut aws_region = None;
    let mut bedrock_model_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                if !name.to_lowercase().ends_with(".pdf") {
                    return Err(bad_request("Only PDF files are supported"));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read upload: {}", e)))?;
                filename = Some(name);
                bytes = Some(data.to_vec());
            }
            Some("aws_region") => {
                aws_region = read_text_field(field).await?;
            }
            Some("bedrock_model_id") => {
                bedrock_model_id = read_text_field(field).await?;
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| bad_request("Missing 'file' field in multipart form"))?;
    let bytes = bytes.unwrap_or_default();
    if bytes.is_empty() {
        return Err(bad_request("Uploaded file is empty"));
    }
    Ok(DiagramForm {
        filename,
        bytes,
        aws_region,
        bedrock_model_id,
    })
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<Option<String>, AppError> {
    let value = field
        .text()
        .await
        .map_err(|e| bad_request(format!("Failed to read field: {}", e)))?;
    let value = value.trim().to_string();
    Ok((!value.is_empty()).then_some(value))
}

/// Apply per-request summarizer overrides to a copy of the configuration.
fn config_with_overrides(
    config: &Config,
    aws_region: Option<&str>,
    bedrock_model_id: Option<&str>,
) -> Config {
    let mut config = config.clone();
    if let Some(region) = aws_region {
        config.summarizer.region = region.to_string();
    }
    if let Some(model_id) = bedrock_model_id {
        config.summarizer.model_id = model_id.to_string();
    }
    config
}

// ============ POST /api/generate-diagram ============

/// Degradation body returned when the summary succeeded but no diagram
/// artifact could be produced. Still HTTP 200: the summary has value.
#[derive(Serialize)]
struct DegradedResponse {
    success: bool,
    message: String,
    summary: String,
    diagram_path: Option<String>,
    note: String,
}

async fn handle_generate_diagram(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_diagram_form(&mut multipart).await?;
    let request = DiagramRequest::new();
    println!(
        "[{}] Upload received: {} ({} bytes)",
        request.id,
        form.filename,
        form.bytes.len()
    );

    let config = config_with_overrides(
        &state.config,
        form.aws_region.as_deref(),
        form.bedrock_model_id.as_deref(),
    );

    // Scratch file is removed when this guard drops, on every exit path.
    let upload = TempUpload::write(
        &config.storage.upload_dir,
        &request.upload_filename(&form.filename),
        &form.bytes,
    )
    .await
    .map_err(|e| internal(format!("{:#}", e)))?;

    let outcome = pipeline::generate_from_pdf(
        &config,
        state.mirror.as_deref(),
        &StderrProgress,
        request,
        upload.path(),
        None,
    )
    .await
    .map_err(|e| internal(format!("{:#}", e)))?;

    match outcome.artifact {
        Some(ref artifact) => {
            let png = tokio::fs::read(artifact)
                .await
                .map_err(|e| internal(format!("Failed to read diagram: {}", e)))?;
            let artifact_name = artifact
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("diagram.png")
                .to_string();
            Ok(png_response(
                png,
                &outcome.request.id,
                &artifact_name,
                outcome.summary.summary_length,
                outcome.mirror_key.as_deref(),
            ))
        }
        None => Ok(Json(degraded_response(&outcome)).into_response()),
    }
}

/// Build the summary-only degradation body. Carries the model's raw summary
/// text: the normalized form is prompt plumbing, not the deliverable.
fn degraded_response(outcome: &pipeline::PipelineOutcome) -> DegradedResponse {
    DegradedResponse {
        success: false,
        message: "Diagram generation is currently unavailable".to_string(),
        summary: outcome.summary.summary.clone(),
        diagram_path: None,
        note: "The document summary was generated successfully. \
               Diagram rendering requires the diagram agent toolchain."
            .to_string(),
    }
}

/// PNG response with provenance headers. Caching is disabled: the same URL
/// yields a different diagram per upload.
fn png_response(
    png: Vec<u8>,
    request_id: &str,
    artifact_name: &str,
    summary_length: usize,
    mirror_key: Option<&str>,
) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/png")
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .header("X-Request-ID", request_id)
        .header("X-Filename", artifact_name)
        .header("X-File-Size", png.len().to_string())
        .header("X-Summary-Length", summary_length.to_string());
    if let Some(key) = mirror_key {
        builder = builder.header("X-S3-Key", key);
    }
    builder
        .body(Body::from(png))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// ============ POST /api/generate-summary ============

#[derive(Serialize)]
struct SummaryResponse {
    success: bool,
    request_id: String,
    filename: String,
    summary: String,
    metadata: SummaryMetadata,
}

#[derive(Serialize)]
struct SummaryMetadata {
    model_id: String,
    summary_type: String,
    input_length: usize,
    summary_length: usize,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

/// Summary-only path: extract and summarize, no diagram stages. The
/// optional `summary_type` form field selects the prompt template.
async fn handle_generate_summary(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SummaryResponse>, AppError> {
    let mut filename = None;
    let mut bytes = None;
    let mut summary_type = SummaryType::Architecture;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                if !name.to_lowercase().ends_with(".pdf") {
                    return Err(bad_request("Only PDF files are supported"));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read upload: {}", e)))?;
                filename = Some(name);
                bytes = Some(data.to_vec());
            }
            Some("summary_type") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read field: {}", e)))?;
                summary_type =
                    SummaryType::parse(&value).map_err(|e| bad_request(e.to_string()))?;
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| bad_request("Missing 'file' field in multipart form"))?;
    let bytes = bytes.unwrap_or_default();
    if bytes.is_empty() {
        return Err(bad_request("Uploaded file is empty"));
    }

    let request = DiagramRequest::new();
    let upload = TempUpload::write(
        &state.config.storage.upload_dir,
        &request.upload_filename(&filename),
        &bytes,
    )
    .await
    .map_err(|e| internal(format!("{:#}", e)))?;

    let extracted = crate::extract::extract_pdf_file(upload.path())
        .map_err(|e| internal(e.to_string()))?;
    let result = summarize::summarize(&state.config.summarizer, &extracted.text, summary_type)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;

    Ok(Json(SummaryResponse {
        success: true,
        request_id: request.id.clone(),
        filename,
        summary: result.summary.clone(),
        metadata: SummaryMetadata {
            model_id: result.model_id,
            summary_type: result.summary_type.as_str().to_string(),
            input_length: result.input_length,
            summary_length: result.summary_length,
            input_tokens: result.usage.input_tokens,
            output_tokens: result.usage.output_tokens,
        },
    }))
}

// ============ POST /api/generate-diagram-from-summary ============

#[derive(Deserialize)]
struct FromSummaryRequest {
    summary: String,
    #[serde(default)]
    extra_instructions: Option<String>,
}

/// Forwards pipeline progress events into the SSE channel.
struct ChannelProgress(tokio::sync::mpsc::UnboundedSender<serde_json::Value>);

impl ProgressReporter for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(value) = serde_json::to_value(&event) {
            let _ = self.0.send(value);
        }
    }
}

/// Diagram generation from a caller-supplied summary, streamed as
/// server-sent events. Each progress event is one JSON object; the stream
/// ends with a `complete` object carrying the base64-encoded image (or
/// `success: false` when no artifact materialized).
async fn handle_diagram_from_summary(
    State(state): State<AppState>,
    Json(body): Json<FromSummaryRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if body.summary.trim().is_empty() {
        return Err(bad_request("summary must not be empty"));
    }

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<serde_json::Value>();
    let config = state.config.clone();
    let mirror = state.mirror.clone();

    tokio::spawn(async move {
        let request = DiagramRequest::new();
        let normalized = normalize::normalize(&body.summary);
        let reporter = ChannelProgress(tx.clone());

        let outcome = pipeline::generate_diagram(
            &config,
            mirror.as_deref(),
            &reporter,
            &request,
            &normalized,
            body.extra_instructions.as_deref(),
        )
        .await;

        let complete = match outcome.artifact {
            Some(ref artifact) => match tokio::fs::read(artifact).await {
                Ok(png) => serde_json::json!({
                    "status": "complete",
                    "success": true,
                    "request_id": request.id,
                    "filename": artifact.file_name().and_then(|n| n.to_str()),
                    "image_base64": base64::engine::general_purpose::STANDARD.encode(&png),
                    "s3_key": outcome.mirror_key,
                }),
                Err(e) => serde_json::json!({
                    "status": "complete",
                    "success": false,
                    "request_id": request.id,
                    "message": format!("Failed to read resolved diagram: {}", e),
                }),
            },
            None => serde_json::json!({
                "status": "complete",
                "success": false,
                "request_id": request.id,
                "message": "No diagram artifact could be produced",
            }),
        };
        let _ = tx.send(complete);
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|value| {
            let event = Event::default().data(value.to_string());
            (Ok(event), rx)
        })
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ============ GET /api/diagrams ============

#[derive(Serialize)]
struct DiagramListResponse {
    diagrams: Vec<DiagramEntry>,
    count: usize,
}

#[derive(Serialize)]
struct DiagramEntry {
    filename: String,
    size: i64,
    /// Unix epoch seconds.
    created: i64,
    /// `"s3"` or `"local"`.
    source: String,
    url: String,
}

/// Merged listing: the S3 mirror is primary, the local directory fills in
/// anything not yet mirrored. Deduplicated by filename, newest first.
async fn handle_list_diagrams(
    State(state): State<AppState>,
) -> Result<Json<DiagramListResponse>, AppError> {
    let mut entries: Vec<DiagramEntry> = Vec::new();

    if let Some(ref mirror) = state.mirror {
        match mirror.list().await {
            Ok(objects) => {
                entries.extend(objects.into_iter().map(|o: StoredObject| DiagramEntry {
                    url: format!("/api/s3-diagram/{}", o.filename),
                    filename: o.filename,
                    size: o.size,
                    created: o.created,
                    source: "s3".to_string(),
                }));
            }
            Err(e) => {
                eprintln!("S3 listing failed, falling back to local only: {:#}", e);
            }
        }
    }

    for local in list_local_diagrams(&state.config) {
        if entries.iter().any(|e| e.filename == local.filename) {
            continue;
        }
        entries.push(local);
    }

    entries.sort_by(|a, b| b.created.cmp(&a.created));
    let count = entries.len();
    Ok(Json(DiagramListResponse {
        diagrams: entries,
        count,
    }))
}

fn list_local_diagrams(config: &Config) -> Vec<DiagramEntry> {
    let dir = config.storage.output_dir.join(GENERATED_SUBDIR);
    let mut entries = Vec::new();
    let Ok(read_dir) = std::fs::read_dir(&dir) else {
        return entries;
    };
    for entry in read_dir.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_servable_image(&path) {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let created = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        entries.push(DiagramEntry {
            url: format!("/api/diagram-file/{}", filename),
            filename: filename.to_string(),
            size: meta.len() as i64,
            created,
            source: "local".to_string(),
        });
    }
    entries
}

fn is_servable_image(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
        Some("png") | Some("jpg") | Some("jpeg") | Some("svg")
    )
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

// ============ GET /api/diagram-file/{filename} ============

/// Serve a diagram from the local canonical directory. The filename is a
/// single path component; anything else is rejected.
async fn handle_diagram_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let path = safe_local_path(&state.config, &filename)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| not_found(format!("No diagram named '{}'", filename)))?;
    Ok(image_response(bytes, &filename))
}

fn safe_local_path(config: &Config, filename: &str) -> Result<PathBuf, AppError> {
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(bad_request("Invalid filename"));
    }
    let path = config
        .storage
        .output_dir
        .join(GENERATED_SUBDIR)
        .join(filename);
    if !is_servable_image(&path) {
        return Err(bad_request("Unsupported file type"));
    }
    Ok(path)
}

fn image_response(bytes: Vec<u8>, filename: &str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(filename))
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// ============ GET /api/s3-diagram/{filename} ============

/// Serve a mirrored diagram, falling back to the local copy when the object
/// is missing from the bucket (or no mirror is configured at all).
async fn handle_s3_diagram(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let local = safe_local_path(&state.config, &filename)?;

    if let Some(ref mirror) = state.mirror {
        match mirror.get(&filename).await {
            Ok(Some(bytes)) => return Ok(image_response(bytes, &filename)),
            Ok(None) => {}
            Err(e) => eprintln!("S3 retrieval failed, trying local copy: {:#}", e),
        }
    }

    let bytes = tokio::fs::read(&local)
        .await
        .map_err(|_| not_found(format!("No diagram named '{}'", filename)))?;
    Ok(image_response(bytes, &filename))
}

// ============ GET /api/diagram/{request_id} ============

/// Legacy lookup: find the newest local diagram whose filename encodes this
/// request id. Exists for clients that stored only the request id.
async fn handle_diagram_by_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Response, AppError> {
    let dir = state.config.storage.output_dir.join(GENERATED_SUBDIR);
    let Ok(read_dir) = std::fs::read_dir(&dir) else {
        return Err(not_found(format!("No diagram for request '{}'", request_id)));
    };

    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;
    for entry in read_dir.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if naming::request_id_from_filename(name).as_deref() != Some(request_id.as_str()) {
            continue;
        }
        let Ok(mtime) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if best.as_ref().map(|(_, t)| mtime > *t).unwrap_or(true) {
            best = Some((path, mtime));
        }
    }

    let (path, _) =
        best.ok_or_else(|| not_found(format!("No diagram for request '{}'", request_id)))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("diagram.png")
        .to_string();
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| internal(format!("Failed to read diagram: {}", e)))?;
    Ok(image_response(bytes, &filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_rejects_traversal() {
        let config = Config::minimal();
        assert!(safe_local_path(&config, "../secret.png").is_err());
        assert!(safe_local_path(&config, "a/b.png").is_err());
        assert!(safe_local_path(&config, "notes.txt").is_err());
        assert!(safe_local_path(&config, "x_diagram.png").is_ok());
    }

    #[test]
    fn content_types_cover_supported_formats() {
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("a.svg"), "image/svg+xml");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }

    #[test]
    fn summarizer_overrides_apply_per_request() {
        let base = Config::minimal();
        let overridden =
            config_with_overrides(&base, Some("eu-west-1"), Some("anthropic.claude-test"));
        assert_eq!(overridden.summarizer.region, "eu-west-1");
        assert_eq!(overridden.summarizer.model_id, "anthropic.claude-test");

        // Absent fields leave the configured values untouched.
        let unchanged = config_with_overrides(&base, None, None);
        assert_eq!(unchanged.summarizer.region, base.summarizer.region);
        assert_eq!(unchanged.summarizer.model_id, base.summarizer.model_id);
    }

    #[test]
    fn degraded_body_carries_raw_summary() {
        use crate::extract::ExtractedContent;
        use crate::pipeline::PipelineOutcome;
        use crate::summarize::{SummaryResult, SummaryType, TokenUsage};

        let outcome = PipelineOutcome {
            request: DiagramRequest::new(),
            extracted: ExtractedContent {
                text: String::new(),
                pages: Vec::new(),
                num_pages: 0,
                method: "pdf-extract".to_string(),
            },
            summary: SummaryResult {
                summary: "## Raw **markdown** summary".to_string(),
                model_id: "m".to_string(),
                summary_type: SummaryType::Architecture,
                input_length: 10,
                summary_length: 27,
                usage: TokenUsage::default(),
            },
            normalized_summary: "Raw markdown summary.".to_string(),
            artifact: None,
            mirror_key: None,
        };

        let body = degraded_response(&outcome);
        assert!(!body.success);
        assert_eq!(body.summary, "## Raw **markdown** summary");
        assert!(body.diagram_path.is_none());
    }

    #[test]
    fn summary_payload_includes_request_id() {
        let response = SummaryResponse {
            success: true,
            request_id: "abc123".to_string(),
            filename: "doc.pdf".to_string(),
            summary: "s".to_string(),
            metadata: SummaryMetadata {
                model_id: "m".to_string(),
                summary_type: "general".to_string(),
                input_length: 1,
                summary_length: 1,
                input_tokens: None,
                output_tokens: None,
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["request_id"], "abc123");
    }
}
