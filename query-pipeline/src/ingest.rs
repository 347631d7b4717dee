use std::sync::Arc;

use common::{
    error::AppError, storage::types::document_chunk::DocumentChunk,
    utils::embedding::EmbeddingProvider,
};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::info;

use crate::chunk_store::ChunkStore;

/// Splits documents into overlapping chunks, embeds them and writes them to
/// the chunk store. Re-ingesting a source first removes its previous chunks
/// so a document is never half old, half new.
pub struct Ingestor {
    embedder: Arc<EmbeddingProvider>,
    store: Arc<ChunkStore>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<EmbeddingProvider>,
        store: Arc<ChunkStore>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            chunk_size,
            chunk_overlap,
        }
    }

    /// Replaces all stored chunks for `source` with chunks of `text`.
    /// Returns how many chunks were written.
    pub async fn ingest_document(&self, source: &str, text: &str) -> Result<usize, AppError> {
        let pieces = split_text(text, self.chunk_size, self.chunk_overlap)?;

        self.store.delete_by_source(source).await?;

        if pieces.is_empty() {
            info!(source, "Document contained no text; removed existing chunks");
            return Ok(0);
        }

        let embeddings = self.embedder.embed_batch(pieces.clone()).await?;

        let written = pieces.len();
        for (offset, (piece, embedding)) in pieces.into_iter().zip(embeddings).enumerate() {
            self.store
                .upsert(DocumentChunk::new(
                    source.to_string(),
                    piece,
                    embedding,
                    offset,
                ))
                .await?;
        }

        info!(source, chunks = written, "Ingested document");
        Ok(written)
    }
}

/// Splits `text` into chunks of at most `chunk_size` characters with
/// `chunk_overlap` characters of overlap between consecutive chunks.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, AppError> {
    if chunk_size == 0 {
        return Err(AppError::Validation("chunk_size must be positive".into()));
    }
    if chunk_overlap >= chunk_size {
        return Err(AppError::Validation(format!(
            "chunk_overlap must be smaller than the chunk_size of {chunk_size}"
        )));
    }

    let config = ChunkConfig::new(chunk_size)
        .with_overlap(chunk_overlap)
        .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))?;
    let splitter = TextSplitter::new(config);

    Ok(splitter
        .chunks(text)
        .map(str::to_owned)
        .filter(|chunk| !chunk.trim().is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::db::SurrealDbClient;

    async fn ingestor() -> Ingestor {
        let db = Arc::new(SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string()).await.unwrap());
        let store = Arc::new(ChunkStore::new(db, 8));
        store.ensure_ready().await.unwrap();
        Ingestor::new(Arc::new(EmbeddingProvider::new_hashed(8)), store, 40, 10)
    }

    #[test]
    fn test_split_respects_chunk_size() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = split_text(text, 20, 5).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20);
        }
    }

    #[test]
    fn test_split_rejects_overlap_not_smaller_than_size() {
        assert!(matches!(
            split_text("text", 10, 10),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            split_text("text", 0, 0),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_split_drops_whitespace_only_chunks() {
        let chunks = split_text("   \n\n   ", 10, 0).unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_writes_ordered_chunks() {
        let ingestor = ingestor().await;

        let written = ingestor
            .ingest_document(
                "guide.md",
                "Refunds are issued within fourteen days. Shipping takes two days.",
            )
            .await
            .unwrap();

        assert!(written > 0);
        assert_eq!(ingestor.store.count().await.unwrap(), written as i64);
    }

    #[tokio::test]
    async fn test_reingest_replaces_previous_chunks() {
        let ingestor = ingestor().await;

        ingestor
            .ingest_document("guide.md", "Original text about refunds and shipping.")
            .await
            .unwrap();
        let written = ingestor
            .ingest_document("guide.md", "Shorter text.")
            .await
            .unwrap();

        assert_eq!(ingestor.store.count().await.unwrap(), written as i64);
    }

    #[tokio::test]
    async fn test_ingest_empty_document_clears_source() {
        let ingestor = ingestor().await;

        ingestor
            .ingest_document("guide.md", "Some text worth chunking here.")
            .await
            .unwrap();
        let written = ingestor.ingest_document("guide.md", "   ").await.unwrap();

        assert_eq!(written, 0);
        assert_eq!(ingestor.store.count().await.unwrap(), 0);
    }
}
