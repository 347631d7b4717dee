use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};

use crate::{
    error::AppError,
    utils::config::{AppConfig, EmbeddingBackendKind},
};

/// Maps text to a fixed-dimension vector. The backend is resolved once at
/// startup: either the OpenAI embeddings API, or a deterministic token-hash
/// projection used when no external provider is configured.
#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    OpenAI {
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        dimensions: u32,
    },
    Hashed {
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub fn new_openai(client: Arc<Client<OpenAIConfig>>, model: String, dimensions: u32) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            },
        }
    }

    pub fn new_hashed(dimension: usize) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
        }
    }

    pub fn from_config(
        config: &AppConfig,
        openai_client: Option<Arc<Client<OpenAIConfig>>>,
    ) -> Result<Self, AppError> {
        match config.embedding_backend {
            EmbeddingBackendKind::Hashed => Ok(Self::new_hashed(config.embedding_dimension)),
            EmbeddingBackendKind::OpenAI => {
                let client = openai_client.ok_or_else(|| {
                    AppError::Validation(
                        "openai embedding backend requires an api key".to_string(),
                    )
                })?;
                Ok(Self::new_openai(
                    client,
                    config.embedding_model.clone(),
                    config.embedding_dimension as u32,
                ))
            }
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::Hashed { .. } => "hashed",
            EmbeddingInner::OpenAI { .. } => "openai",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => *dimension,
            EmbeddingInner::OpenAI { dimensions, .. } => *dimensions as usize,
        }
    }

    /// Embeds a single text. The hashed backend never fails; the OpenAI
    /// backend surfaces unreachable-provider conditions as
    /// `AppError::ProviderUnavailable`.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(hashed_embedding(text, *dimension)),
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.clone())
                    .input([text])
                    .dimensions(*dimensions)
                    .build()
                    .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;

                let response = client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;

                response
                    .data
                    .into_iter()
                    .next()
                    .map(|item| item.embedding)
                    .ok_or_else(|| {
                        AppError::ProviderUnavailable(
                            "no embedding data received from OpenAI API".to_string(),
                        )
                    })
            }
        }
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .iter()
                .map(|text| hashed_embedding(text, *dimension))
                .collect()),
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.clone())
                    .input(texts)
                    .dimensions(*dimensions)
                    .build()
                    .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;

                let response = client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;

                Ok(response.data.into_iter().map(|item| item.embedding).collect())
            }
        }
    }
}

/// Token-hash pseudo-embedding: bucket token counts over the vector, then
/// L2-normalize. Same text always yields the same vector; distinct texts land
/// in different buckets with overwhelming probability.
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];

    let mut token_seen = false;
    for token in tokens(text) {
        token_seen = true;
        let idx = bucket(&token, dim);
        if let Some(value) = vector.get_mut(idx) {
            *value += 1.0;
        }
    }

    if !token_seen {
        return vector;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_hashed_embedding_is_deterministic() {
        let provider = EmbeddingProvider::new_hashed(128);
        let first = hashed_embedding("What is the refund policy?", provider.dimension());
        let second = hashed_embedding("What is the refund policy?", provider.dimension());
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_texts_produce_distinct_vectors() {
        let a = hashed_embedding("vacation days for new employees", 256);
        let b = hashed_embedding("server room access procedure", 256);
        assert_ne!(a, b);
        assert!(
            cosine(&a, &b) < 0.5,
            "unrelated texts should have low similarity"
        );
    }

    #[test]
    fn test_embedding_is_normalized() {
        let vector = hashed_embedding("normalize me please", 64);
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_yields_zero_vector() {
        let vector = hashed_embedding("   ", 32);
        assert_eq!(vector.len(), 32);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_hashed_provider_never_fails() {
        let provider = EmbeddingProvider::new_hashed(64);
        let embedding = provider.embed("any text at all").await.expect("hashed embed");
        assert_eq!(embedding.len(), 64);

        let batch = provider
            .embed_batch(vec!["one".to_string(), "two".to_string()])
            .await
            .expect("hashed batch embed");
        assert_eq!(batch.len(), 2);
    }
}
