use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{deserialize_datetime, deserialize_flexible_id, document_chunk::DocumentChunk, StoredObject},
    },
};

use crate::scoring::{compare_scored, distance_to_similarity};

/// HNSW search width passed to the knn operator.
const KNN_EF: usize = 40;

/// Holds embedded document chunks and answers nearest-neighbor queries
/// against the SurrealDB HNSW index. Searches fail `NotReady` until the index
/// has been set up for the configured dimension; an empty result set is a
/// valid answer, not a failure.
pub struct ChunkStore {
    db: Arc<SurrealDbClient>,
    dimension: usize,
    ready: AtomicBool,
}

/// Row shape returned by the knn query: chunk fields plus the reported
/// distance.
#[derive(Debug, Deserialize)]
struct KnnHit {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    source_document: String,
    text: String,
    embedding: Vec<f32>,
    offset: usize,
    #[serde(deserialize_with = "deserialize_datetime")]
    created_at: DateTime<Utc>,
    distance: f32,
}

impl KnnHit {
    fn into_scored(self) -> (DocumentChunk, f32) {
        let score = distance_to_similarity(self.distance);
        (
            DocumentChunk {
                id: self.id,
                source_document: self.source_document,
                text: self.text,
                embedding: self.embedding,
                offset: self.offset,
                created_at: self.created_at,
            },
            score,
        )
    }
}

impl ChunkStore {
    pub fn new(db: Arc<SurrealDbClient>, dimension: usize) -> Self {
        Self {
            db,
            dimension,
            ready: AtomicBool::new(false),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Defines the vector index for the configured dimension and marks the
    /// store ready. Until this succeeds every search fails `NotReady`.
    pub async fn ensure_ready(&self) -> Result<(), AppError> {
        self.db
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_embedding_document_chunk \
                 ON TABLE document_chunk FIELDS embedding \
                 HNSW DIMENSION {} DIST COSINE",
                self.dimension
            ))
            .await?;

        self.ready.store(true, Ordering::Release);
        info!(dimension = self.dimension, "Chunk store vector index ready");
        Ok(())
    }

    /// Stores or replaces a chunk keyed by its id.
    pub async fn upsert(&self, chunk: DocumentChunk) -> Result<(), AppError> {
        if chunk.embedding.len() != self.dimension {
            return Err(AppError::Validation(format!(
                "chunk embedding has dimension {}, index expects {}",
                chunk.embedding.len(),
                self.dimension
            )));
        }

        self.db.upsert_item(chunk).await?;
        Ok(())
    }

    /// Top-k nearest chunks by cosine similarity, descending, ties broken by
    /// ingestion order.
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<(DocumentChunk, f32)>, AppError> {
        if !self.is_ready() {
            return Err(AppError::NotReady(
                "vector index has not been initialized".to_string(),
            ));
        }

        if query_vector.len() != self.dimension {
            return Err(AppError::Validation(format!(
                "query vector has dimension {}, index expects {}",
                query_vector.len(),
                self.dimension
            )));
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT *, vector::distance::knn() AS distance FROM {} \
             WHERE embedding <|{},{}|> $embedding ORDER BY distance",
            DocumentChunk::table_name(),
            k,
            KNN_EF
        );

        let hits: Vec<KnnHit> = self
            .db
            .query(query)
            .bind(("embedding", query_vector.to_vec()))
            .await
            .and_then(|mut response| response.take(0))
            .map_err(|e| {
                warn!(error = %e, "Vector search failed; treating index as unavailable");
                AppError::NotReady(e.to_string())
            })?;

        let mut scored: Vec<(DocumentChunk, f32)> =
            hits.into_iter().map(KnnHit::into_scored).collect();
        scored.sort_by(compare_scored);

        debug!(hits = scored.len(), k, "Vector search completed");
        Ok(scored)
    }

    /// Removes every chunk belonging to a source document.
    pub async fn delete_by_source(&self, source_document: &str) -> Result<(), AppError> {
        self.db
            .query(format!(
                "DELETE {} WHERE source_document = $source",
                DocumentChunk::table_name()
            ))
            .bind(("source", source_document.to_owned()))
            .await?;

        Ok(())
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        #[derive(Debug, Deserialize)]
        struct CountResult {
            count: i64,
        }

        let result: Option<CountResult> = self
            .db
            .query("SELECT count() AS count FROM type::table($table) GROUP ALL")
            .bind(("table", DocumentChunk::table_name()))
            .await?
            .take(0)?;

        Ok(result.map(|r| r.count).unwrap_or(0))
    }
}
