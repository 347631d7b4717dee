use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{deserialize_datetime, deserialize_flexible_id, serialize_datetime, StoredObject};

/// A bounded span of text from a source document, stored together with its
/// vector embedding. Immutable once created by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub source_document: String,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Position of the chunk within its source document, starting at 0.
    pub offset: usize,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime"
    )]
    pub created_at: DateTime<Utc>,
}

impl StoredObject for DocumentChunk {
    fn table_name() -> &'static str {
        "document_chunk"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl DocumentChunk {
    pub fn new(
        source_document: String,
        text: String,
        embedding: Vec<f32>,
        offset: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_document,
            text,
            embedding,
            offset,
            created_at: Utc::now(),
        }
    }
}
