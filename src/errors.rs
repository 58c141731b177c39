use std::path::PathBuf;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Body sent with the 503 while the pipeline is still warming up.
pub const NOT_READY_MESSAGE: &str = "Chatbot not ready. Please try again.";

/// Body sent with 503 once initialization has failed for good.
pub const STARTUP_FAILED_MESSAGE: &str =
    "Chatbot initialization failed. Restart the service to retry.";

/// Opaque body sent with every 500; the real cause only goes to the logs.
pub const INTERNAL_MESSAGE: &str =
    "An error occurred while processing your request. Please try again.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("service not ready")]
    NotReady,
    #[error("service failed to start")]
    StartupFailed,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, NOT_READY_MESSAGE.to_string()),
            ApiError::StartupFailed => (
                StatusCode::SERVICE_UNAVAILABLE,
                STARTUP_FAILED_MESSAGE.to_string(),
            ),
            ApiError::Internal(msg) => {
                // Clients get a fixed message; the detail stays server-side.
                tracing::error!("request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

/// Failures of the one-shot startup pipeline.
///
/// Every variant is terminal for the process: the server keeps answering
/// HTTP but `/chat` stays 503 and `/health` reports the stored cause.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("document not found: {0}")]
    DocumentNotFound(PathBuf),
    #[error("pdf parse error: {0}")]
    PdfParse(String),
    #[error("document contains no extractable text")]
    EmptyDocument,
    #[error("invalid chunking config: overlap {overlap} must be smaller than chunk size {size}")]
    InvalidChunkConfig { size: usize, overlap: usize },
    #[error("chunking produced no chunks")]
    NoChunks,
    #[error("no embedding backend available (ollama: {ollama}; local fallback: {fallback})")]
    EmbeddingUnavailable { ollama: String, fallback: String },
    #[error("vector index error: {0}")]
    Index(#[from] IndexError),
    #[error("initialization timed out after {0} seconds")]
    TimedOut(u64),
    #[error("initialization panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },
    #[error("backend returned an empty embedding")]
    EmptyEmbedding,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chat request failed: {0}")]
    Request(String),
    #[error("chat response missing message content")]
    MissingContent,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("embedding failed while indexing: {0}")]
    Embed(#[from] EmbedError),
    #[error("index was built with {stored}, current backend is {current}")]
    FingerprintMismatch { stored: String, current: String },
    #[error("index probe returned no results")]
    ProbeFailed,
}

/// Request-time failures of the answer pipeline. All of them map to an
/// opaque 500 at the HTTP layer.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("query embedding failed: {0}")]
    Embed(#[from] EmbedError),
    #[error("similarity search failed: {0}")]
    Index(#[from] IndexError),
    #[error("generation failed: {0}")]
    Llm(#[from] LlmError),
    #[error("model returned an empty answer")]
    EmptyAnswer,
}
