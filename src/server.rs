//! JSON HTTP API over the QA engine.
//!
//! Exposes the public operation surface — ask, ingest, clear memory — to
//! any frontend. All state lives in an explicit [`AppState`]; there is no
//! process-global handler. Requests that touch the engine serialize
//! through one async mutex, matching the single-writer discipline the
//! persisted index and memory log require.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/chat` | Answer a question (`{"question": "..."}`) |
//! | `POST` | `/api/documents` | Upload and ingest a document (`{"name", "content_base64"}`) |
//! | `POST` | `/api/clear-memory` | Drop the conversation log |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser frontends
//! can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::engine::QaEngine;
use crate::error::Error;
use crate::ingest;
use crate::models::Document;
use crate::store::DocumentStore;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<DocumentStore>,
    /// One writer at a time: answering mutates memory, uploads mutate the
    /// index.
    engine: Arc<tokio::sync::Mutex<QaEngine>>,
}

/// Start the HTTP server on the configured bind address.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = QaEngine::from_config(config).await?;
    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(DocumentStore::new(config.storage.root.clone())),
        engine: Arc::new(tokio::sync::Mutex::new(engine)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/documents", post(upload_document))
        .route("/api/clear-memory", post(clear_memory))
        .layer(cors)
        .with_state(state);

    let bind = &config.server.bind;
    info!(bind = %bind, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": { "code": code, "message": message } })),
    )
        .into_response()
}

async fn health() -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
}

/// Answer a question. Validation (including the empty-question case) is
/// the engine's job, so the response is always a structured answer.
async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let mut engine = state.engine.lock().await;
    let result = engine.answer_question(&req.question).await;
    Json(result).into_response()
}

#[derive(Deserialize)]
struct UploadRequest {
    name: String,
    content_base64: String,
}

async fn upload_document(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Response {
    let bytes = match base64::engine::general_purpose::STANDARD.decode(&req.content_base64) {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "bad_request",
                format!("content_base64 is not valid base64: {}", e),
            )
        }
    };

    let id = match state.store.store(&bytes, &req.name) {
        Ok(id) => id,
        Err(e @ Error::InvalidInput(_)) => {
            return error_response(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()),
    };

    let file = match state.store.get(&id) {
        Ok(Some(file)) => file,
        Ok(None) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "stored document not found".to_string(),
            )
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()),
    };

    let raw_text = match crate::extract::extract_text(&file.path) {
        Ok(text) => text,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "extraction_failed", e.to_string())
        }
    };

    let doc = Document {
        id: file.id.clone(),
        name: file.name.clone(),
        raw_text,
    };

    let engine = state.engine.lock().await;
    let Some(index) = engine.index() else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "no vector index configured".to_string(),
        );
    };

    match ingest::ingest_document(index, &state.config.chunking, &doc, false).await {
        Ok(ingest::IngestOutcome::Indexed(count)) => Json(serde_json::json!({
            "id": doc.id,
            "name": doc.name,
            "chunks_indexed": count,
        }))
        .into_response(),
        Ok(ingest::IngestOutcome::UpToDate) => Json(serde_json::json!({
            "id": doc.id,
            "name": doc.name,
            "chunks_indexed": 0,
        }))
        .into_response(),
        Err(e @ (Error::InvalidInput(_) | Error::InvalidChunkConfig { .. })) => {
            error_response(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
        }
        Err(e @ Error::Embedding(_)) => {
            error_response(StatusCode::BAD_GATEWAY, "embedding_failed", e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()),
    }
}

async fn clear_memory(State(state): State<AppState>) -> Response {
    let mut engine = state.engine.lock().await;
    match engine.clear_memory() {
        Ok(()) => Json(serde_json::json!({ "status": "memory cleared" })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()),
    }
}
