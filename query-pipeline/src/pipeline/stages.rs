use common::{
    error::AppError, storage::types::cached_answer::CacheEntry,
    utils::fingerprint::question_fingerprint,
};
use state_machines::core::GuardError;
use tracing::{debug, instrument};

use crate::{
    cache::ResponseCache,
    composer::{AnswerComposer, ComposedAnswer},
    retriever::Retriever,
    ScoredChunk,
};

use super::state::{AskMachine, CacheChecked, Composed, Ready, Retrieved};

pub struct AskContext<'a> {
    pub cache: &'a ResponseCache,
    pub retriever: &'a Retriever,
    pub composer: &'a AnswerComposer,
    pub question: String,
    pub fingerprint: String,
    pub cached: Option<CacheEntry>,
    pub retrieved: Vec<ScoredChunk>,
    pub composed: Option<ComposedAnswer>,
}

impl<'a> AskContext<'a> {
    pub fn new(
        cache: &'a ResponseCache,
        retriever: &'a Retriever,
        composer: &'a AnswerComposer,
        question: &str,
    ) -> Self {
        Self {
            cache,
            retriever,
            composer,
            question: question.to_string(),
            fingerprint: question_fingerprint(question),
            cached: None,
            retrieved: Vec::new(),
            composed: None,
        }
    }
}

#[instrument(level = "trace", skip_all)]
pub async fn check_cache(
    machine: AskMachine<(), Ready>,
    ctx: &mut AskContext<'_>,
) -> Result<AskMachine<(), CacheChecked>, AppError> {
    ctx.cached = ctx.cache.get(&ctx.fingerprint).await;
    debug!(hit = ctx.cached.is_some(), "Checked response cache");

    machine
        .check_cache()
        .map_err(|(_, guard)| map_guard_error("check_cache", guard))
}

#[instrument(level = "trace", skip_all)]
pub async fn retrieve(
    machine: AskMachine<(), CacheChecked>,
    ctx: &mut AskContext<'_>,
) -> Result<AskMachine<(), Retrieved>, AppError> {
    match ctx.retriever.retrieve(&ctx.question).await {
        Ok(result) => {
            ctx.retrieved = result.chunks;
            machine
                .retrieve()
                .map_err(|(_, guard)| map_guard_error("retrieve", guard))
        }
        Err(e) => {
            let _ = machine.abort();
            Err(e)
        }
    }
}

#[instrument(level = "trace", skip_all)]
pub async fn compose(
    machine: AskMachine<(), Retrieved>,
    ctx: &mut AskContext<'_>,
) -> Result<AskMachine<(), Composed>, AppError> {
    let composed = ctx.composer.compose(&ctx.question, &ctx.retrieved).await;
    ctx.composed = Some(composed);

    machine
        .compose()
        .map_err(|(_, guard)| map_guard_error("compose", guard))
}

#[instrument(level = "trace", skip_all)]
pub async fn write_cache(
    machine: AskMachine<(), Composed>,
    ctx: &mut AskContext<'_>,
) -> Result<AskMachine<(), super::state::CacheWritten>, AppError> {
    if let Some(composed) = &ctx.composed {
        ctx.cache
            .put(&ctx.fingerprint, &composed.answer, &composed.sources)
            .await;
    }

    machine
        .write_cache()
        .map_err(|(_, guard)| map_guard_error("write_cache", guard))
}

pub fn map_guard_error(stage: &'static str, err: GuardError) -> AppError {
    AppError::InternalError(format!(
        "state machine guard '{stage}' failed: guard={}, event={}, kind={:?}",
        err.guard, err.event, err.kind
    ))
}
