use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{EmbeddingBackend, PROBE_TEXT};
use crate::errors::EmbedError;

/// Embeddings from a local Ollama server via its native `/api/embed` API.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OllamaEmbedder {
    /// Connects to Ollama and validates the configured model.
    ///
    /// Two checks run before the embedder is handed out: `/api/tags` must
    /// answer within `probe_timeout`, and one embedding of [`PROBE_TEXT`]
    /// must come back non-empty. The second call also pins the dimension
    /// count recorded in the index fingerprint.
    pub async fn connect(
        base_url: &str,
        model: &str,
        probe_timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = Client::new();

        let tags_url = format!("{}/api/tags", base_url);
        let response = client.get(&tags_url).timeout(probe_timeout).send().await?;
        if !response.status().is_success() {
            return Err(EmbedError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("{} returned {}", tags_url, response.status()),
            });
        }

        let mut embedder = Self {
            base_url,
            model: model.to_string(),
            dimensions: 0,
            client,
        };

        let probe = embedder.embed_batch(&[PROBE_TEXT.to_string()]).await?;
        let dims = probe.first().map(|vector| vector.len()).unwrap_or(0);
        if dims == 0 {
            return Err(EmbedError::EmptyEmbedding);
        }
        embedder.dimensions = dims;

        Ok(embedder)
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EmbedError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("embed returned {}: {}", status, text),
            });
        }

        let payload: Value = response.json().await?;
        parse_embed_response(&payload)
    }
}

fn parse_embed_response(payload: &Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let rows = payload
        .get("embeddings")
        .and_then(|value| value.as_array())
        .ok_or_else(|| EmbedError::BackendResponse {
            backend: "ollama".to_string(),
            details: "response missing embeddings array".to_string(),
        })?;

    let mut result = Vec::with_capacity(rows.len());
    for row in rows {
        let vector: Vec<f32> = row
            .as_array()
            .ok_or_else(|| EmbedError::BackendResponse {
                backend: "ollama".to_string(),
                details: "embedding is not an array".to_string(),
            })?
            .iter()
            .map(|value| value.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vector);
    }

    Ok(result)
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_batch(texts).await
    }
}
