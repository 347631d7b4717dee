use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Which language-model backend answers are delegated to. Resolved once at
/// startup; `None` keeps the pipeline on the deterministic offline composer.
#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelProviderKind {
    None,
    Anthropic,
    OpenAI,
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    OpenAI,
    Hashed,
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    Database,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    // Database
    #[serde(default = "default_surrealdb_address")]
    pub surrealdb_address: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_username: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_password: String,
    #[serde(default = "default_surrealdb_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_namespace")]
    pub surrealdb_database: String,

    // Language model
    #[serde(default = "default_model_provider")]
    pub llm_provider: ModelProviderKind,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    // Embeddings
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackendKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    // Cache
    #[serde(default = "default_cache_backend")]
    pub cache_backend: CacheBackendKind,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    // Retrieval
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    // Ingestion CLI
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_surrealdb_address() -> String {
    "mem://".to_string()
}

fn default_surrealdb_credential() -> String {
    "root".to_string()
}

fn default_surrealdb_namespace() -> String {
    "knowledge".to_string()
}

fn default_model_provider() -> ModelProviderKind {
    ModelProviderKind::None
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_max_tokens() -> u32 {
    750
}

fn default_temperature() -> f32 {
    0.1
}

fn default_generate_timeout_secs() -> u64 {
    30
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_embedding_backend() -> EmbeddingBackendKind {
    EmbeddingBackendKind::Hashed
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    512
}

fn default_cache_backend() -> CacheBackendKind {
    CacheBackendKind::Memory
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_retrieval_top_k() -> usize {
    3
}

fn default_min_similarity() -> f32 {
    0.0
}

fn default_max_context_chars() -> usize {
    6000
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_chunk_size() -> usize {
    600
}

fn default_chunk_overlap() -> usize {
    100
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize_from_empty_source() {
        let config: AppConfig = Config::builder()
            .build()
            .expect("builder failed")
            .try_deserialize()
            .expect("defaults should satisfy every field");

        assert_eq!(config.llm_provider, ModelProviderKind::None);
        assert_eq!(config.embedding_backend, EmbeddingBackendKind::Hashed);
        assert_eq!(config.cache_backend, CacheBackendKind::Memory);
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.retrieval_top_k, 3);
        assert_eq!(config.embedding_dimension, 512);
        assert!((config.min_similarity - 0.0).abs() < f32::EPSILON);
    }
}
