use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{answer_record::AnswerRecord, StoredObject},
    },
};
use tracing::warn;

/// Destination for completed question/answer records. Recording happens off
/// the request path, so a failing sink must never fail a request.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn append(&self, record: AnswerRecord) -> Result<(), AppError>;
}

pub struct SurrealHistorySink {
    db: Arc<SurrealDbClient>,
}

impl SurrealHistorySink {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<AnswerRecord>, AppError> {
        let mut response = self
            .db
            .query("SELECT * FROM type::table($table) ORDER BY created_at DESC LIMIT $limit")
            .bind(("table", AnswerRecord::table_name()))
            .bind(("limit", limit))
            .await?;
        let records: Vec<AnswerRecord> = response.take(0)?;
        Ok(records)
    }
}

#[async_trait]
impl HistorySink for SurrealHistorySink {
    async fn append(&self, record: AnswerRecord) -> Result<(), AppError> {
        if let Err(e) = self.db.store_item(record).await {
            warn!(error = %e, "Failed to persist answer record");
            return Err(e.into());
        }
        Ok(())
    }
}
