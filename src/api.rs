//! HTTP surface for Docsift.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /api/function_rag` – Extract text from a blob (`file_name`) or an image URL
//!   (`image_url`) and return it as `text/plain`, corrected by the chat model unless `correct`
//!   is `false`. `chunked: true` splits the text on markdown headings and corrects chunk by
//!   chunk. Every field may also be passed as a query parameter, so `GET` works too.
//! - `POST /api/index` – Run layout analysis on a blob or URL, chunk it, embed the chunks, and
//!   upsert them into the vector index.
//! - `POST /api/ask` – Answer a question from the indexed chunks most similar to it.
//! - `GET /metrics` – Observe extraction, correction, indexing, and question counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//! - `GET /health` – Liveness probe.
//!
//! Failures are never returned as extracted text. Request validation fails with 400; every
//! other failure is rendered as an `Error: <description>` body with status 500.

use crate::logging::request_span;
use crate::metrics::MetricsSnapshot;
use crate::processing::{
    AskOutcome, AskRequest, DocumentSource, ExtractRequest, IndexRequest, ProcessingApi,
    ProcessingError,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use std::sync::Arc;
use tracing::Instrument;

const INVALID_JSON: &str = "Invalid JSON format";
const MISSING_FILE_NAME: &str = "Please provide 'file_name' in the request body.";
const MISSING_INDEX_SOURCE: &str =
    "Error: Please provide 'file_name' or 'url' in the request body.";
const MISSING_QUESTION: &str = "Error: Please provide 'question' in the request body.";

/// Build the HTTP router exposing the extraction and retrieval API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route(
            "/api/function_rag",
            get(function_rag::<S>).post(function_rag::<S>),
        )
        .route("/api/index", post(index_document::<S>))
        .route("/api/ask", post(ask::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .route("/health", get(health))
        .with_state(service)
}

/// Parse a JSON request body regardless of its declared content type.
///
/// A blank body counts as `{}` so query-only requests reach the handlers.
fn parse_json_body<T>(body: &Bytes) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_slice(b"{}")
    } else {
        serde_json::from_slice(body)
    }
}

/// Extraction parameters, read from the JSON body or the query string.
#[derive(Debug, Default, Deserialize)]
struct FunctionRagParams {
    /// Blob name inside the configured container.
    #[serde(default)]
    file_name: Option<String>,
    /// Publicly reachable image to OCR by URL.
    #[serde(default)]
    image_url: Option<String>,
    /// Override for the server's correction default.
    #[serde(default)]
    correct: Option<bool>,
    /// Correct header chunks one at a time.
    #[serde(default)]
    chunked: Option<bool>,
}

impl FunctionRagParams {
    /// Fill fields missing from the body with the query parameters.
    fn merge(self, query: FunctionRagParams) -> Self {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Self {
            file_name: present(self.file_name).or_else(|| present(query.file_name)),
            image_url: present(self.image_url).or_else(|| present(query.image_url)),
            correct: self.correct.or(query.correct),
            chunked: self.chunked.or(query.chunked),
        }
    }

    /// `file_name` wins over `image_url`.
    fn source(&self) -> Option<DocumentSource> {
        self.file_name
            .clone()
            .map(DocumentSource::Blob)
            .or_else(|| self.image_url.clone().map(DocumentSource::Url))
    }
}

/// Extract text from a document and return it as plain text.
///
/// The body is parsed by hand so malformed JSON and a missing file reference produce the
/// exact messages clients already match on.
async fn function_rag<S>(
    State(service): State<Arc<S>>,
    Query(query): Query<FunctionRagParams>,
    body: Bytes,
) -> Result<Response, AppError>
where
    S: ProcessingApi,
{
    run_function_rag(service, query, body)
        .instrument(request_span("function_rag"))
        .await
}

async fn run_function_rag<S>(
    service: Arc<S>,
    query: FunctionRagParams,
    body: Bytes,
) -> Result<Response, AppError>
where
    S: ProcessingApi,
{
    let params: FunctionRagParams = parse_json_body(&body).map_err(|error| {
        tracing::warn!(error = %error, "Rejected malformed request body");
        AppError::bad_request(INVALID_JSON)
    })?;
    let params = params.merge(query);
    let source = params
        .source()
        .ok_or_else(|| AppError::bad_request(MISSING_FILE_NAME))?;
    let chunked = params.chunked.unwrap_or(false);

    tracing::info!(source = %source.label(), chunked, "Extraction request received");
    let outcome = service
        .extract(ExtractRequest {
            source,
            correct: params.correct,
            chunked,
        })
        .await
        .map_err(|error| {
            tracing::warn!(error = %error, "Extraction request failed");
            AppError::from(error)
        })?;
    tracing::info!(
        kind = ?outcome.kind,
        corrected = outcome.corrected,
        skipped_chunks = outcome.skipped_chunks.len(),
        "Extraction request completed"
    );

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        outcome.text,
    )
        .into_response())
}

/// Request body for `POST /api/index`.
#[derive(Deserialize)]
struct IndexBody {
    /// Blob name inside the configured container.
    #[serde(default)]
    file_name: Option<String>,
    /// Document URL the analysis service downloads itself.
    #[serde(default)]
    url: Option<String>,
}

/// Success response for `POST /api/index`.
#[derive(Serialize)]
struct IndexResponse {
    /// Number of unique chunks produced for the document.
    chunks_indexed: usize,
    /// Token budget used for oversize sections.
    chunk_size: usize,
    /// Chunks newly written to the index.
    inserted: usize,
    /// Chunks that already existed and were overwritten.
    updated: usize,
    /// Chunks rejected by the index.
    failed: usize,
    /// Number of duplicate chunks skipped within this request.
    skipped_duplicates: usize,
}

/// Index a document into the vector store.
async fn index_document<S>(
    State(service): State<Arc<S>>,
    body: Bytes,
) -> Result<Json<IndexResponse>, AppError>
where
    S: ProcessingApi,
{
    run_index_document(service, body)
        .instrument(request_span("index"))
        .await
}

async fn run_index_document<S>(
    service: Arc<S>,
    body: Bytes,
) -> Result<Json<IndexResponse>, AppError>
where
    S: ProcessingApi,
{
    let body: IndexBody = parse_json_body(&body).map_err(AppError::invalid_json)?;
    let source = match (body.file_name, body.url) {
        (Some(file_name), _) => DocumentSource::Blob(file_name),
        (None, Some(url)) => DocumentSource::Url(url),
        (None, None) => return Err(AppError::bad_request(MISSING_INDEX_SOURCE)),
    };
    let label = source.label().to_string();
    let outcome = service.index_document(IndexRequest { source }).await?;
    tracing::info!(
        source = %label,
        chunks = outcome.chunk_count,
        chunk_size = outcome.chunk_size,
        inserted = outcome.inserted,
        updated = outcome.updated,
        skipped_duplicates = outcome.skipped_duplicates,
        "Index request completed"
    );
    Ok(Json(IndexResponse {
        chunks_indexed: outcome.chunk_count,
        chunk_size: outcome.chunk_size,
        inserted: outcome.inserted,
        updated: outcome.updated,
        failed: outcome.failed,
        skipped_duplicates: outcome.skipped_duplicates,
    }))
}

/// Request body for `POST /api/ask`.
#[derive(Deserialize)]
struct AskBody {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Answer a question from the indexed documents.
async fn ask<S>(State(service): State<Arc<S>>, body: Bytes) -> Result<Json<AskOutcome>, AppError>
where
    S: ProcessingApi,
{
    run_ask(service, body).instrument(request_span("ask")).await
}

async fn run_ask<S>(service: Arc<S>, body: Bytes) -> Result<Json<AskOutcome>, AppError>
where
    S: ProcessingApi,
{
    let body: AskBody = parse_json_body(&body).map_err(AppError::invalid_json)?;
    let question = body
        .question
        .ok_or_else(|| AppError::bad_request(MISSING_QUESTION))?;
    let outcome = service
        .ask(AskRequest {
            question,
            top_k: body.top_k,
        })
        .await?;
    tracing::info!(sources = outcome.sources.len(), "Question answered");
    Ok(Json(outcome))
}

/// Return the processing counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: ProcessingApi,
{
    Json(service.metrics_snapshot())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "extract",
                method: "POST",
                path: "/api/function_rag",
                description: "Extract text from a blob (image, PDF, Word, Excel, PowerPoint) or an image URL and return it as plain text, corrected by the chat model unless \"correct\" is false.",
                request_example: Some(json!({
                    "file_name": "scans/invoice.pdf",
                    "correct": true,
                    "chunked": false
                })),
            },
            CommandDescriptor {
                name: "index",
                method: "POST",
                path: "/api/index",
                description: "Analyze a document's layout, chunk it on headings, embed the chunks, and upsert them into the vector index.",
                request_example: Some(json!({ "file_name": "handbook.pdf" })),
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/api/ask",
                description: "Answer a question from the most similar indexed chunks. Response returns { \"answer\": string, \"sources\": [...] }.",
                request_example: Some(json!({
                    "question": "What is the refund policy?",
                    "top_k": 3
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return extraction, correction, and indexing counters.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness probe.",
                request_example: None,
            },
        ],
    })
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn invalid_json(error: serde_json::Error) -> Self {
        tracing::warn!(error = %error, "Rejected malformed request body");
        Self::bad_request(format!("Error: {INVALID_JSON}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        let status = match &inner {
            ProcessingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: format!("Error: {inner}"),
        }
    }
}
