pub mod cache;
pub mod chunk_store;
pub mod composer;
pub mod history;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod retriever;
pub mod scoring;

use common::storage::types::document_chunk::DocumentChunk;

pub use cache::ResponseCache;
pub use chunk_store::ChunkStore;
pub use composer::{AnswerComposer, NO_INFORMATION_ANSWER};
pub use history::{HistorySink, SurrealHistorySink};
pub use ingest::Ingestor;
pub use model::LanguageModel;
pub use pipeline::{AskOutcome, HealthStatus, QueryPipeline};
pub use retriever::Retriever;

// A matched chunk plus its similarity score for downstream prompt assembly.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Chunks for one question, ordered by descending similarity.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
}
