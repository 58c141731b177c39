//! Embedding backends.
//!
//! The pipeline prefers a running Ollama instance and degrades to a local
//! hashing embedder when none is reachable, so the service still comes up
//! on machines without a model server. Whichever backend gets picked is
//! validated with one throwaway embedding before anything is indexed.

pub mod hashed;
pub mod ollama;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::errors::{EmbedError, InitError};

pub use hashed::HashedEmbedder;
pub use ollama::OllamaEmbedder;

/// Fixed text used to validate a backend and to probe the index.
pub const PROBE_TEXT: &str = "test";

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Identifier recorded in the index fingerprint.
    fn model_id(&self) -> &str;
    /// Vector length this backend produces.
    fn dimensions(&self) -> usize;
    /// Embeds a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embeds a single text.
pub async fn embed_one(
    backend: &dyn EmbeddingBackend,
    text: &str,
) -> Result<Vec<f32>, EmbedError> {
    let vectors = backend.embed(&[text.to_string()]).await?;
    match vectors.into_iter().next() {
        Some(vector) if !vector.is_empty() => Ok(vector),
        _ => Err(EmbedError::EmptyEmbedding),
    }
}

/// Picks the embedding backend for this run.
///
/// Ollama wins when it answers the `/api/tags` probe and returns a usable
/// vector for [`PROBE_TEXT`]; otherwise the local hashing embedder takes
/// over. Only when both fail does startup abort.
pub async fn select_backend(config: &AppConfig) -> Result<Arc<dyn EmbeddingBackend>, InitError> {
    let probe_timeout = Duration::from_secs(config.ollama_probe_timeout_secs);

    let ollama_err = match OllamaEmbedder::connect(
        &config.ollama_url,
        &config.embedding_model,
        probe_timeout,
    )
    .await
    {
        Ok(backend) => {
            tracing::info!(
                "Using Ollama embeddings: model={} dims={}",
                backend.model_id(),
                backend.dimensions()
            );
            return Ok(Arc::new(backend));
        }
        Err(err) => err,
    };

    tracing::warn!(
        "Ollama embeddings unavailable ({}); falling back to local hashed embeddings",
        ollama_err
    );

    let fallback = HashedEmbedder::default();
    match embed_one(&fallback, PROBE_TEXT).await {
        Ok(_) => {
            tracing::info!(
                "Using local hashed embeddings: model={} dims={}",
                fallback.model_id(),
                fallback.dimensions()
            );
            Ok(Arc::new(fallback))
        }
        Err(fallback_err) => Err(InitError::EmbeddingUnavailable {
            ollama: ollama_err.to_string(),
            fallback: fallback_err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyBackend;

    #[async_trait]
    impl EmbeddingBackend for EmptyBackend {
        fn model_id(&self) -> &str {
            "empty"
        }
        fn dimensions(&self) -> usize {
            0
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|_| Vec::new()).collect())
        }
    }

    #[tokio::test]
    async fn embed_one_rejects_empty_vectors() {
        let err = embed_one(&EmptyBackend, "anything").await.unwrap_err();
        assert!(matches!(err, EmbedError::EmptyEmbedding));
    }

    #[tokio::test]
    async fn selection_degrades_to_hashed_when_ollama_is_down() {
        let mut config = AppConfig::default();
        // Discard port; connection is refused immediately.
        config.ollama_url = "http://127.0.0.1:9".to_string();
        config.ollama_probe_timeout_secs = 1;

        let backend = select_backend(&config).await.unwrap();
        assert_eq!(backend.model_id(), HashedEmbedder::MODEL_ID);
        assert_eq!(backend.dimensions(), 384);
    }
}
