//! SQLite-backed vector index over chunk embeddings.
//!
//! Each indexed chunk is a row in `chunks` plus a row in `chunk_vectors`
//! holding its embedding as a little-endian f32 BLOB. Opening the index
//! creates the database and schema if absent; a committed transaction is
//! the durability point, so the index survives process restarts.
//!
//! Scores are cosine similarity: **higher = more relevant**, in `[-1, 1]`.
//! [`VectorIndex::search_with_threshold`] keeps hits scoring strictly
//! above the threshold.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::embedding::{self, blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkMetadata, SearchResult};

pub struct VectorIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl VectorIndex {
    /// Open (or create) the index at `path`.
    pub async fn open(
        path: &Path,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Persistence(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let index = Self {
            pool,
            embedder,
            batch_size: batch_size.max(1),
        };
        index.create_schema().await?;
        Ok(index)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                source TEXT NOT NULL,
                UNIQUE(document_id, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                dims INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunk_vectors_document_id ON chunk_vectors(document_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of indexed entries (chunks with an embedding).
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Embed and insert a batch of chunks. No-op on an empty slice.
    ///
    /// All rows for the batch are written in a single transaction, so the
    /// entry count always equals the embedded-chunk count, and the commit
    /// persists the index.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let batch_vectors = self.embedder.embed(&texts).await?;
            if batch_vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    batch_vectors.len()
                )));
            }
            vectors.extend(batch_vectors);
        }

        let dims = self.expected_dims(&vectors).await?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, hash, source)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(&chunk.source_name)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, dims, embedding, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(dims as i64)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(chunks.len())
    }

    /// Every vector in this add, and any vector already stored, must share
    /// one dimensionality.
    async fn expected_dims(&self, vectors: &[Vec<f32>]) -> Result<usize> {
        let dims = vectors[0].len();
        if dims == 0 {
            return Err(Error::Embedding("embedding has zero dimensions".to_string()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(Error::Embedding(format!(
                "embedding dimensionality mismatch within batch: {} vs {}",
                dims,
                bad.len()
            )));
        }

        let existing: Option<i64> = sqlx::query_scalar("SELECT dims FROM chunk_vectors LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        if let Some(existing) = existing {
            if existing as usize != dims {
                return Err(Error::Embedding(format!(
                    "embedding dimensionality mismatch: index holds {}, new vectors have {}",
                    existing, dims
                )));
            }
        }

        Ok(dims)
    }

    /// Return the `k` most similar chunks to `query`, best first.
    ///
    /// An index that has never been written returns an empty result rather
    /// than an error.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if self.is_empty().await? {
            return Ok(Vec::new());
        }

        let query_vec = embedding::embed_query(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query(
            r#"
            SELECT c.text, c.source, c.document_id, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Retrieval(e.to_string()))?;

        let mut results: Vec<SearchResult> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let score = cosine_similarity(&query_vec, &vector) as f64;
                SearchResult {
                    text: row.get("text"),
                    score,
                    metadata: ChunkMetadata {
                        source: row.get("source"),
                        file_id: row.get("document_id"),
                    },
                }
            })
            .collect();

        // Sort by score desc, then text asc for a deterministic order.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.text.cmp(&b.text))
        });
        results.truncate(k);

        Ok(results)
    }

    /// [`search`](Self::search), keeping only hits whose similarity is
    /// strictly greater than `score_threshold`.
    pub async fn search_with_threshold(
        &self,
        query: &str,
        k: usize,
        score_threshold: f64,
    ) -> Result<Vec<SearchResult>> {
        let mut results = self.search(query, k).await?;
        results.retain(|r| r.score > score_threshold);
        Ok(results)
    }

    /// Chunk hashes stored for a document, in chunk order. Empty when the
    /// document is not indexed.
    pub async fn document_hashes(&self, document_id: &str) -> Result<Vec<String>> {
        let hashes: Vec<String> = sqlx::query_scalar(
            "SELECT hash FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(hashes)
    }

    /// Delete all chunks and vectors for a document. Returns the number of
    /// chunks removed.
    pub async fn remove_document(&self, document_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledEmbedder;
    use async_trait::async_trait;
    use sha2::{Digest, Sha256};

    const STUB_DIMS: usize = 32;

    /// Deterministic word-bucket embedder: texts sharing words land close
    /// together, disjoint texts stay near-orthogonal.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            STUB_DIMS
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| stub_vector(t)).collect())
        }
    }

    fn stub_vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; STUB_DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % STUB_DIMS;
            v[bucket] += 1.0;
        }
        v
    }

    fn make_chunk(doc: &str, idx: i64, text: &str) -> Chunk {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Chunk {
            id: format!("{}-{}", doc, idx),
            document_id: doc.to_string(),
            chunk_index: idx,
            text: text.to_string(),
            hash: format!("{:x}", hasher.finalize()),
            source_name: format!("{}.txt", doc),
        }
    }

    async fn open_index(dir: &tempfile::TempDir) -> VectorIndex {
        VectorIndex::open(
            &dir.path().join("index.sqlite"),
            Arc::new(StubEmbedder),
            64,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn empty_index_search_returns_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        // DisabledEmbedder proves search never embeds against an empty index.
        let index = VectorIndex::open(
            &dir.path().join("index.sqlite"),
            Arc::new(DisabledEmbedder),
            64,
        )
        .await
        .unwrap();

        assert!(index.is_empty().await.unwrap());
        assert!(index.search("anything", 4).await.unwrap().is_empty());
        assert!(index
            .search_with_threshold("anything", 4, 0.7)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn add_empty_slice_is_noop() {
        let dir = tempfile::TempDir::new().unwrap();
        let index = open_index(&dir).await;
        assert_eq!(index.add(&[]).await.unwrap(), 0);
        assert!(index.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn add_and_search_ranks_by_similarity() {
        let dir = tempfile::TempDir::new().unwrap();
        let index = open_index(&dir).await;

        index
            .add(&[
                make_chunk("doc1", 0, "Paris is the capital of France."),
                make_chunk("doc2", 0, "Bananas ripen from green to yellow."),
            ])
            .await
            .unwrap();
        assert_eq!(index.len().await.unwrap(), 2);

        let results = index
            .search("What is the capital of France?", 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].text.contains("Paris"));
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].metadata.file_id, "doc1");
        assert_eq!(results[0].metadata.source, "doc1.txt");
        for r in &results {
            assert!((-1.0..=1.0).contains(&r.score));
        }
    }

    #[tokio::test]
    async fn threshold_filter_never_admits_low_scores() {
        let dir = tempfile::TempDir::new().unwrap();
        let index = open_index(&dir).await;

        index
            .add(&[
                make_chunk("doc1", 0, "Paris is the capital of France."),
                make_chunk("doc2", 0, "Bananas ripen from green to yellow."),
                make_chunk("doc3", 0, "Volcanic rock forms when lava cools."),
            ])
            .await
            .unwrap();

        let all = index
            .search("What is the capital of France?", 10)
            .await
            .unwrap();
        for threshold in [-1.0, 0.0, all[0].score, 1.0] {
            let filtered = index
                .search_with_threshold("What is the capital of France?", 10, threshold)
                .await
                .unwrap();
            assert!(
                filtered.iter().all(|r| r.score > threshold),
                "threshold {} admitted a low score",
                threshold
            );
        }
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("index.sqlite");

        let index = VectorIndex::open(&path, Arc::new(StubEmbedder), 64)
            .await
            .unwrap();
        index
            .add(&[make_chunk("doc1", 0, "Paris is the capital of France.")])
            .await
            .unwrap();
        index.close().await;

        let reopened = VectorIndex::open(&path, Arc::new(StubEmbedder), 64)
            .await
            .unwrap();
        assert_eq!(reopened.len().await.unwrap(), 1);
        let results = reopened.search("capital of France", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].text.contains("Paris"));
    }

    #[tokio::test]
    async fn remove_document_drops_chunks_and_vectors() {
        let dir = tempfile::TempDir::new().unwrap();
        let index = open_index(&dir).await;

        index
            .add(&[
                make_chunk("doc1", 0, "first part of document one"),
                make_chunk("doc1", 1, "second part of document one"),
                make_chunk("doc2", 0, "an unrelated document"),
            ])
            .await
            .unwrap();

        assert_eq!(index.document_hashes("doc1").await.unwrap().len(), 2);
        assert_eq!(index.remove_document("doc1").await.unwrap(), 2);
        assert!(index.document_hashes("doc1").await.unwrap().is_empty());
        assert_eq!(index.len().await.unwrap(), 1);
    }
}
