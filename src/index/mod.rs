//! Persisted vector index over the document's chunks.
//!
//! `get_or_build` decides at startup whether the index on disk can be
//! trusted. Reuse requires three things: the stored fingerprint matches
//! the active embedding backend, the index is non-empty, and a probe
//! query returns a result. Anything else triggers a rebuild; a database
//! that cannot even be opened is moved aside rather than deleted.

pub mod sqlite;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::chunker::Chunk;
use crate::embeddings::{embed_one, EmbeddingBackend, PROBE_TEXT};
use crate::errors::{EmbedError, IndexError, InitError};

pub use sqlite::SqliteVectorIndex;

/// Embedding requests sent per HTTP call while building.
const EMBED_BATCH: usize = 32;

/// A chunk as stored in the index.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub id: String,
    pub page: u32,
    pub content: String,
}

/// Result of a similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: IndexedChunk,
    /// Cosine similarity; higher is better.
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert_batch(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<(), IndexError>;
    async fn search(&self, query_embedding: &[f32], limit: usize)
        -> Result<Vec<ScoredChunk>, IndexError>;
    async fn count(&self) -> Result<usize, IndexError>;
}

/// How `get_or_build` obtained its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Warm start; zero chunks were embedded.
    Reused,
    Rebuilt,
}

pub async fn get_or_build(
    db_path: &Path,
    backend: Arc<dyn EmbeddingBackend>,
    chunks: &[Chunk],
) -> Result<(Arc<SqliteVectorIndex>, IndexOutcome), InitError> {
    if db_path.exists() {
        match try_reuse(db_path, backend.as_ref()).await {
            Ok(store) => {
                let count = store.count().await?;
                tracing::info!(
                    "Reusing vector index at {} ({} chunks)",
                    db_path.display(),
                    count
                );
                return Ok((Arc::new(store), IndexOutcome::Reused));
            }
            Err(err) => {
                tracing::warn!(
                    "Existing index at {} is not reusable ({}); rebuilding",
                    db_path.display(),
                    err
                );
                if matches!(err, IndexError::Database(_) | IndexError::Io(_)) {
                    move_unreadable_aside(db_path)?;
                }
            }
        }
    }

    let store = build(db_path, backend, chunks).await?;
    Ok((Arc::new(store), IndexOutcome::Rebuilt))
}

async fn try_reuse(
    db_path: &Path,
    backend: &dyn EmbeddingBackend,
) -> Result<SqliteVectorIndex, IndexError> {
    let store = SqliteVectorIndex::with_path(db_path).await?;

    let current = fingerprint_label(backend);
    let Some((model, dims)) = store.fingerprint().await? else {
        return Err(IndexError::FingerprintMismatch {
            stored: "none".to_string(),
            current,
        });
    };
    if model != backend.model_id() || dims != backend.dimensions() {
        return Err(IndexError::FingerprintMismatch {
            stored: format!("{}/{}", model, dims),
            current,
        });
    }

    if store.count().await? == 0 {
        return Err(IndexError::ProbeFailed);
    }
    probe(&store, backend).await?;

    Ok(store)
}

async fn build(
    db_path: &Path,
    backend: Arc<dyn EmbeddingBackend>,
    chunks: &[Chunk],
) -> Result<SqliteVectorIndex, InitError> {
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).map_err(|err| InitError::Index(IndexError::Io(err)))?;
    }

    let store = SqliteVectorIndex::with_path(db_path).await?;
    store.clear().await?;
    // The fingerprint is written only after the last batch; a database
    // without one is never reused, so an interrupted build cannot pass
    // try_reuse on the next start.
    store.clear_fingerprint().await?;

    for batch in chunks.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = backend.embed(&texts).await.map_err(IndexError::Embed)?;
        if vectors.len() != batch.len() {
            return Err(InitError::Index(IndexError::Embed(
                EmbedError::BackendResponse {
                    backend: backend.model_id().to_string(),
                    details: format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
                },
            )));
        }

        let items: Vec<(Chunk, Vec<f32>)> = batch.iter().cloned().zip(vectors).collect();
        store.insert_batch(items).await?;
    }

    store
        .set_fingerprint(backend.model_id(), backend.dimensions())
        .await?;

    tracing::info!("Indexed {} chunks into {}", chunks.len(), db_path.display());

    probe(&store, backend.as_ref()).await?;
    Ok(store)
}

/// One embed-and-search round trip that must return a result before the
/// index is trusted.
async fn probe(store: &SqliteVectorIndex, backend: &dyn EmbeddingBackend) -> Result<(), IndexError> {
    let query = embed_one(backend, PROBE_TEXT).await?;
    let results = store.search(&query, 1).await?;
    if results.is_empty() {
        return Err(IndexError::ProbeFailed);
    }
    Ok(())
}

fn fingerprint_label(backend: &dyn EmbeddingBackend) -> String {
    format!("{}/{}", backend.model_id(), backend.dimensions())
}

/// Renames a database that could not be opened so the rebuild starts from
/// a clean file while the evidence stays on disk.
fn move_unreadable_aside(db_path: &Path) -> Result<(), InitError> {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let file_name = db_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "index.db".to_string());
    let target = db_path.with_file_name(format!("{}.corrupt-{}", file_name, stamp));

    fs::rename(db_path, &target).map_err(|err| InitError::Index(IndexError::Io(err)))?;

    // Stale WAL sidecars must not attach themselves to the fresh file.
    for suffix in ["-wal", "-shm"] {
        let sidecar = db_path.with_file_name(format!("{}{}", file_name, suffix));
        if sidecar.exists() {
            let _ = fs::remove_file(&sidecar);
        }
    }

    tracing::warn!("Moved unreadable index to {}", target.display());
    Ok(())
}
