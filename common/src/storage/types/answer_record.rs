use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{deserialize_datetime, deserialize_flexible_id, serialize_datetime, StoredObject};

/// Write-once history entry for an answered question. Appended to the history
/// sink after a request completes and never read back by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub question: String,
    pub answer: String,
    pub tokens_used: u32,
    pub latency_ms: i64,
    pub sources: Vec<String>,
    pub cache_hit: bool,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime"
    )]
    pub created_at: DateTime<Utc>,
}

impl StoredObject for AnswerRecord {
    fn table_name() -> &'static str {
        "answer_record"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl AnswerRecord {
    pub fn new(
        question: String,
        answer: String,
        tokens_used: u32,
        latency_ms: i64,
        sources: Vec<String>,
        cache_hit: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question,
            answer,
            tokens_used,
            latency_ms,
            sources,
            cache_hit,
            created_at: Utc::now(),
        }
    }
}
