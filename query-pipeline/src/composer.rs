use std::sync::Arc;

use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, info, warn};

use crate::{
    model::{LanguageModel, ModelFailure},
    ScoredChunk,
};

/// Fixed answer returned when retrieval produced no usable chunks.
pub const NO_INFORMATION_ANSWER: &str =
    "I could not find relevant information in the knowledge base.";

/// Characters of chunk text quoted per excerpt in the offline answer.
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct ComposedAnswer {
    pub answer: String,
    pub sources: Vec<String>,
    pub tokens_used: u32,
    pub model_used: bool,
}

struct ContextBlock {
    source: String,
    text: String,
}

/// Builds a budget-bounded prompt from retrieved chunks and delegates to the
/// language model. Transient model failures are retried once with backoff;
/// any final failure falls back to a deterministic offline answer, so
/// composition itself never fails.
pub struct AnswerComposer {
    model: Arc<LanguageModel>,
    max_context_chars: usize,
    retry_backoff_ms: u64,
}

impl AnswerComposer {
    pub fn new(model: Arc<LanguageModel>, max_context_chars: usize, retry_backoff_ms: u64) -> Self {
        Self {
            model,
            max_context_chars: max_context_chars.max(1),
            retry_backoff_ms,
        }
    }

    pub fn model_configured(&self) -> bool {
        self.model.configured()
    }

    pub async fn compose(&self, question: &str, chunks: &[ScoredChunk]) -> ComposedAnswer {
        if chunks.is_empty() {
            debug!("No chunks retrieved; returning the fixed no-information answer");
            return ComposedAnswer {
                answer: NO_INFORMATION_ANSWER.to_string(),
                sources: Vec::new(),
                tokens_used: 0,
                model_used: false,
            };
        }

        let blocks = self.select_context(chunks);
        let sources = sources_of(&blocks);
        let prompt = build_prompt(question, &blocks);

        let strategy = ExponentialBackoff::from_millis(self.retry_backoff_ms)
            .map(jitter)
            .take(1);
        let outcome = RetryIf::spawn(
            strategy,
            || self.model.generate(&prompt),
            |failure: &ModelFailure| failure.is_retryable(),
        )
        .await;

        match outcome {
            Ok(generated) => ComposedAnswer {
                answer: generated.text,
                sources,
                tokens_used: generated.tokens_used,
                model_used: true,
            },
            Err(ModelFailure::Unavailable) => {
                info!("No language model configured; composing offline answer");
                ComposedAnswer {
                    answer: offline_answer(question, &blocks),
                    sources,
                    tokens_used: 0,
                    model_used: false,
                }
            }
            Err(failure) => {
                warn!(error = %failure, "Language model failed after retry; composing offline answer");
                ComposedAnswer {
                    answer: offline_answer(question, &blocks),
                    sources,
                    tokens_used: 0,
                    model_used: false,
                }
            }
        }
    }

    /// Picks chunk texts highest-score-first within the character budget. The
    /// top chunk is always included, truncated to the budget if oversized;
    /// lower-scored chunks that no longer fit are skipped.
    fn select_context(&self, chunks: &[ScoredChunk]) -> Vec<ContextBlock> {
        let mut remaining = self.max_context_chars;
        let mut blocks = Vec::new();

        for (index, scored) in chunks.iter().enumerate() {
            let chars = scored.chunk.text.chars().count();

            if index == 0 && chars > remaining {
                blocks.push(ContextBlock {
                    source: scored.chunk.source_document.clone(),
                    text: scored.chunk.text.chars().take(remaining).collect(),
                });
                remaining = 0;
                break;
            }

            if chars > remaining {
                continue;
            }

            remaining -= chars;
            blocks.push(ContextBlock {
                source: scored.chunk.source_document.clone(),
                text: scored.chunk.text.clone(),
            });
        }

        blocks
    }
}

fn sources_of(blocks: &[ContextBlock]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for block in blocks {
        if !sources.contains(&block.source) {
            sources.push(block.source.clone());
        }
    }
    sources
}

fn build_prompt(question: &str, blocks: &[ContextBlock]) -> String {
    let context = blocks
        .iter()
        .map(|block| format!("Source: {}\n{}", block.source, block.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r"Context Information:
==================
{context}

User Question:
==================
{question}"
    )
}

/// Deterministic answer used when no model is reachable: the question plus
/// the retrieved excerpts and their sources, without generated prose.
fn offline_answer(question: &str, blocks: &[ContextBlock]) -> String {
    let mut answer = format!(
        "No language model is available, so this answer lists the most relevant \
         excerpts from the knowledge base.\n\nQuestion: {question}\n"
    );

    for (index, block) in blocks.iter().enumerate() {
        let truncated = block.text.chars().count() > EXCERPT_CHARS;
        let excerpt: String = block.text.chars().take(EXCERPT_CHARS).collect();
        let ellipsis = if truncated { "..." } else { "" };
        answer.push_str(&format!(
            "\n{}. [{}] {}{}",
            index + 1,
            block.source,
            excerpt.trim(),
            ellipsis
        ));
    }

    answer
}
