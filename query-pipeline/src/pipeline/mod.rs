mod stages;
mod state;

use std::{sync::Arc, time::Instant};

use async_openai::{config::OpenAIConfig, Client};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            answer_record::AnswerRecord,
            query_metrics::{MetricsSnapshot, QueryMetrics},
        },
    },
    utils::{
        config::{AppConfig, CacheBackendKind},
        embedding::EmbeddingProvider,
    },
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    cache::ResponseCache,
    chunk_store::ChunkStore,
    composer::AnswerComposer,
    history::{HistorySink, SurrealHistorySink},
    model::LanguageModel,
    retriever::Retriever,
};

/// Result of one answered question.
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: String,
    pub sources: Vec<String>,
    pub tokens_used: u32,
    pub latency_ms: i64,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub chunk_store_ready: bool,
    pub cache_ready: bool,
    pub model_configured: bool,
}

/// Top-level orchestrator. Each `ask` call runs the cache check, retrieval,
/// composition and cache write stages for one question; the only shared state
/// between in-flight requests is the store, the cache and the metrics row.
pub struct QueryPipeline {
    db: Arc<SurrealDbClient>,
    chunk_store: Arc<ChunkStore>,
    cache: ResponseCache,
    retriever: Retriever,
    composer: AnswerComposer,
    history: Arc<dyn HistorySink>,
}

impl QueryPipeline {
    /// Wires every component from configuration and prepares the database
    /// for first use.
    pub async fn new(db: Arc<SurrealDbClient>, config: &AppConfig) -> Result<Self, AppError> {
        let openai_client = config.openai_api_key.as_deref().map(|key| {
            Arc::new(Client::with_config(
                OpenAIConfig::new()
                    .with_api_key(key)
                    .with_api_base(&config.openai_base_url),
            ))
        });

        let embedder = Arc::new(EmbeddingProvider::from_config(
            config,
            openai_client.clone(),
        )?);
        let chunk_store = Arc::new(ChunkStore::new(db.clone(), config.embedding_dimension));
        chunk_store.ensure_ready().await?;
        QueryMetrics::ensure_initialized(&db).await?;

        let ttl = chrono::Duration::seconds(i64::try_from(config.cache_ttl_secs).unwrap_or(3600));
        let cache = match config.cache_backend {
            CacheBackendKind::Memory => ResponseCache::in_memory(ttl),
            CacheBackendKind::Database => ResponseCache::database(db.clone(), ttl),
        };

        let model = Arc::new(LanguageModel::from_config(config, openai_client));
        info!(
            embedding = embedder.backend_label(),
            cache = cache.backend_label(),
            model = model.backend_label(),
            "Query pipeline configured"
        );

        let retriever = Retriever::new(
            embedder,
            chunk_store.clone(),
            config.retrieval_top_k,
            config.min_similarity,
        );
        let composer = AnswerComposer::new(model, config.max_context_chars, config.retry_backoff_ms);
        let history: Arc<dyn HistorySink> = Arc::new(SurrealHistorySink::new(db.clone()));

        Ok(Self {
            db,
            chunk_store,
            cache,
            retriever,
            composer,
            history,
        })
    }

    pub fn from_parts(
        db: Arc<SurrealDbClient>,
        chunk_store: Arc<ChunkStore>,
        cache: ResponseCache,
        retriever: Retriever,
        composer: AnswerComposer,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            db,
            chunk_store,
            cache,
            retriever,
            composer,
            history,
        }
    }

    /// Answers a question. Only an unavailable retrieval path fails the call;
    /// model trouble degrades to the offline composer and cache trouble to a
    /// miss.
    pub async fn ask(&self, question: &str) -> Result<AskOutcome, AppError> {
        let started = Instant::now();
        let mut ctx =
            stages::AskContext::new(&self.cache, &self.retriever, &self.composer, question);

        let machine = state::ready();
        let machine = stages::check_cache(machine, &mut ctx).await?;

        if let Some(entry) = ctx.cached.take() {
            machine
                .complete()
                .map_err(|(_, guard)| stages::map_guard_error("complete", guard))?;
            let outcome = AskOutcome {
                answer: entry.answer,
                sources: entry.sources,
                tokens_used: 0,
                latency_ms: elapsed_ms(started),
                cached: true,
            };
            self.record_completion(question, &outcome).await;
            return Ok(outcome);
        }

        let machine = stages::retrieve(machine, &mut ctx).await?;
        let machine = stages::compose(machine, &mut ctx).await?;
        let machine = stages::write_cache(machine, &mut ctx).await?;
        machine
            .complete()
            .map_err(|(_, guard)| stages::map_guard_error("complete", guard))?;

        let composed = ctx.composed.take().ok_or_else(|| {
            AppError::InternalError("composed answer missing after pipeline run".to_string())
        })?;
        let outcome = AskOutcome {
            answer: composed.answer,
            sources: composed.sources,
            tokens_used: composed.tokens_used,
            latency_ms: elapsed_ms(started),
            cached: false,
        };
        self.record_completion(question, &outcome).await;
        Ok(outcome)
    }

    pub async fn health(&self) -> HealthStatus {
        HealthStatus {
            chunk_store_ready: self.chunk_store.is_ready(),
            cache_ready: self.cache.healthy().await,
            model_configured: self.composer.model_configured(),
        }
    }

    pub async fn metrics_snapshot(&self) -> Result<MetricsSnapshot, AppError> {
        let metrics = QueryMetrics::ensure_initialized(&self.db).await?;
        Ok(metrics.snapshot())
    }

    pub async fn flush_cache(&self) -> Result<(), AppError> {
        self.cache.flush().await
    }

    pub fn chunk_store(&self) -> Arc<ChunkStore> {
        self.chunk_store.clone()
    }

    pub fn embedder(&self) -> Arc<EmbeddingProvider> {
        self.retriever.embedder()
    }

    /// History and metrics are best effort; a failing sink is logged and the
    /// answer is still returned. The history append runs on its own task so a
    /// slow sink never holds up the caller.
    async fn record_completion(&self, question: &str, outcome: &AskOutcome) {
        let record = AnswerRecord::new(
            question.to_string(),
            outcome.answer.clone(),
            outcome.tokens_used,
            outcome.latency_ms,
            outcome.sources.clone(),
            outcome.cached,
        );
        let history = self.history.clone();
        tokio::spawn(async move {
            if let Err(e) = history.append(record).await {
                warn!(error = %e, "Failed to record answer history");
            }
        });
        if let Err(e) = QueryMetrics::record_request(
            &self.db,
            outcome.cached,
            outcome.latency_ms,
            outcome.tokens_used,
        )
        .await
        {
            warn!(error = %e, "Failed to update query metrics");
        }
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
