//! SQLite-backed vector index.
//!
//! One table of chunks with their embeddings as little-endian f32 blobs,
//! searched by brute-force cosine similarity, plus a key/value meta table
//! recording which embedding backend the vectors came from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{IndexedChunk, ScoredChunk, VectorStore};
use crate::chunker::Chunk;
use crate::errors::IndexError;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteVectorIndex {
    pub async fn with_path(db_path: &Path) -> Result<Self, IndexError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            db_path: db_path.to_path_buf(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                page INTEGER NOT NULL,
                ordinal INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    /// Stored backend identity, or `None` when the meta rows are absent
    /// or unreadable.
    pub async fn fingerprint(&self) -> Result<Option<(String, usize)>, IndexError> {
        let model: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'embedding_model'")
                .fetch_optional(&self.pool)
                .await?;
        let dims: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'embedding_dims'")
                .fetch_optional(&self.pool)
                .await?;

        let (Some(model), Some(dims)) = (model, dims) else {
            return Ok(None);
        };
        let Ok(dims) = dims.parse::<usize>() else {
            return Ok(None);
        };
        Ok(Some((model, dims)))
    }

    pub async fn set_fingerprint(&self, model: &str, dims: usize) -> Result<(), IndexError> {
        let entries = [
            ("embedding_model", model.to_string()),
            ("embedding_dims", dims.to_string()),
        ];
        for (key, value) in entries {
            sqlx::query(
                "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
                 VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Removes the stored backend identity; the chunk rows stay.
    pub async fn clear_fingerprint(&self) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM index_meta WHERE key IN ('embedding_model', 'embedding_dims')")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drops every chunk row; the meta table stays.
    pub async fn clear(&self) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorIndex {
    async fn insert_batch(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<(), IndexError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            sqlx::query(
                "INSERT OR REPLACE INTO chunks (id, page, ordinal, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&chunk.id)
            .bind(chunk.page as i64)
            .bind(chunk.index as i64)
            .bind(&chunk.content)
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        let rows = sqlx::query("SELECT id, page, content, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        // try_get so a row that fails to decode (tampered or foreign file)
        // surfaces as an IndexError and takes the rebuild path upstream.
        let mut scored: Vec<ScoredChunk> = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.try_get("embedding")?;
            if embedding_bytes.is_empty() {
                continue;
            }
            let stored_emb = Self::deserialize_embedding(&embedding_bytes);
            let score = Self::cosine_similarity(query_embedding, &stored_emb);

            let page: i64 = row.try_get("page")?;
            scored.push(ScoredChunk {
                chunk: IndexedChunk {
                    id: row.try_get("id")?,
                    page: page as u32,
                    content: row.try_get("content")?,
                },
                score,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit.max(1));

        Ok(scored)
    }

    async fn count(&self) -> Result<usize, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
