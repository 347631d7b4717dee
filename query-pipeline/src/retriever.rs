use std::sync::Arc;

use common::{
    error::AppError,
    utils::{embedding::EmbeddingProvider, fingerprint::normalize_question},
};
use tracing::{debug, warn};

use crate::{chunk_store::ChunkStore, RetrievalResult, ScoredChunk};

/// Turns a question into ranked chunks: embed the normalized text, run the
/// nearest-neighbour search and drop everything below the similarity floor.
///
/// Retrieval is the one stage that may fail a request, so every underlying
/// failure surfaces as `AppError::RetrievalUnavailable`.
pub struct Retriever {
    embedder: Arc<EmbeddingProvider>,
    store: Arc<ChunkStore>,
    top_k: usize,
    min_similarity: f32,
}

impl Retriever {
    pub fn new(
        embedder: Arc<EmbeddingProvider>,
        store: Arc<ChunkStore>,
        top_k: usize,
        min_similarity: f32,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k,
            min_similarity,
        }
    }

    pub fn embedder(&self) -> Arc<EmbeddingProvider> {
        self.embedder.clone()
    }

    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult, AppError> {
        let normalized = normalize_question(question);
        let embedding = self.embedder.embed(&normalized).await.map_err(|e| {
            warn!(error = %e, "Embedding the question failed");
            AppError::RetrievalUnavailable(format!("embedding failed: {e}"))
        })?;

        let hits = self.store.search(&embedding, self.top_k).await.map_err(|e| {
            warn!(error = %e, "Chunk search failed");
            AppError::RetrievalUnavailable(format!("chunk search failed: {e}"))
        })?;

        let retrieved = hits.len();
        let chunks: Vec<ScoredChunk> = hits
            .into_iter()
            .filter(|(_, score)| *score >= self.min_similarity)
            .map(|(chunk, score)| ScoredChunk { chunk, score })
            .collect();

        debug!(
            retrieved,
            kept = chunks.len(),
            top_k = self.top_k,
            "Retrieved chunks for question"
        );

        Ok(RetrievalResult { chunks })
    }
}
