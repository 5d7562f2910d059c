//! HTTP API for document upload and streaming Q&A.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `POST`   | `/ask` | Stream a cited answer as server-sent events |
//! | `POST`   | `/documents?name=<file>` | Upload a PDF (body = raw bytes) |
//! | `GET`    | `/documents` | List the caller's documents |
//! | `DELETE` | `/documents/{id}` | Remove a document and its index entries |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! Callers identify themselves with an `x-user-id` header; requests
//! without one fall back to the `"default"` user. All reads and writes
//! are scoped to that user.
//!
//! # Error Contract
//!
//! Non-streaming errors use a JSON envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Once an `/ask` stream has started, failures arrive as in-band
//! `error` events instead; the HTTP status is already committed.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support
//! browser-based clients.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use docqa_core::repository::DocumentRepository;
use docqa_core::{sse, AskRequest, Document, Orchestrator, RagError};

use crate::config::Config;
use crate::ingest::Ingestor;

const USER_ID_HEADER: &str = "x-user-id";
const DEFAULT_USER_ID: &str = "default";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub repo: Arc<dyn DocumentRepository>,
    pub ingestor: Arc<Ingestor>,
}

/// Builds the router; split out from [`run_server`] so tests can drive
/// the handlers without binding a socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/documents", post(handle_upload).get(handle_list))
        .route("/documents/{id}", axum::routing::delete(handle_delete))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Binds to `[server].bind` and serves until the process is terminated.
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let bind_addr = state.config.server.bind.clone();
    let app = router(state);

    info!(addr = %bind_addr, "server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn user_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_USER_ID)
        .to_string()
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

fn payload_too_large(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        code: "payload_too_large".to_string(),
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

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Validation(msg) => bad_request(msg),
            RagError::Extraction(msg) => bad_request(msg),
            RagError::Index(msg) | RagError::Generation(msg) => internal(msg),
        }
    }
}

// ============ POST /ask ============

/// Handler for `POST /ask`.
///
/// Validation failures are rejected up front with a 400. Once the
/// request is accepted the response is an SSE stream of `token`,
/// `citation`, `complete`, and `error` events.
async fn handle_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<AskRequest>,
) -> Result<Response, AppError> {
    request.user_id = user_id(&headers);

    let events = state.orchestrator.ask(request)?;
    let frames = events.map(|event| Ok::<_, std::convert::Infallible>(sse::frame_event(&event)));

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}

// ============ POST /documents ============

#[derive(Deserialize)]
struct UploadParams {
    name: String,
}

#[derive(Serialize)]
struct UploadResponse {
    doc_id: String,
    status: String,
}

/// Handler for `POST /documents?name=<file>`.
///
/// Accepts raw PDF bytes, creates a `processing` document record, and
/// ingests in the background. Clients poll `GET /documents` for the
/// final status.
async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let user = user_id(&headers);

    if body.is_empty() {
        return Err(bad_request("request body must not be empty"));
    }
    let max_bytes = state.config.limits.max_file_size_mb * 1024 * 1024;
    if body.len() > max_bytes {
        return Err(payload_too_large(format!(
            "file exceeds {} MB limit",
            state.config.limits.max_file_size_mb
        )));
    }
    if params.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }

    let doc = state.repo.create(&user, params.name.trim()).await?;

    let ingestor = Arc::clone(&state.ingestor);
    let doc_id = doc.id.clone();
    let bytes = body.to_vec();
    tokio::spawn(async move {
        // Outcome lands on the document record; nothing to do here.
        let _ = ingestor.ingest(&doc_id, &user, bytes).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            doc_id: doc.id,
            status: "processing".to_string(),
        }),
    ))
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<Document>,
}

async fn handle_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DocumentListResponse>, AppError> {
    let user = user_id(&headers);
    let documents = state.repo.list_for_user(&user).await?;
    Ok(Json(DocumentListResponse { documents }))
}

// ============ DELETE /documents/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    doc_id: String,
    removed_chunks: usize,
}

/// Handler for `DELETE /documents/{id}`.
///
/// Ownership is checked against the caller; documents belonging to
/// other users are reported as not found rather than forbidden.
async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let user = user_id(&headers);

    let doc = state
        .repo
        .get(&id)
        .await?
        .filter(|d| d.user_id == user)
        .ok_or_else(|| not_found(format!("no document with id: {id}")))?;

    let removed_chunks = state.ingestor.remove(&doc.id, &user).await?;
    Ok(Json(DeleteResponse {
        doc_id: doc.id,
        removed_chunks,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
