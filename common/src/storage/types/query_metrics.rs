use serde::{Deserialize, Serialize};

use super::{deserialize_flexible_id, StoredObject};
use crate::{error::AppError, storage::db::SurrealDbClient};

/// Running counters for the query pipeline, kept in a singleton `current`
/// record and incremented with atomic `UPDATE ... +=` statements.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryMetrics {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub total_requests: i64,
    pub cache_hits: i64,
    pub cache_misses: i64,
    pub total_latency_ms: i64,
    pub total_tokens: i64,
}

/// Aggregated view over the raw counters, as reported to callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_requests: i64,
    pub cache_hit_rate: f64,
    pub avg_latency_ms: f64,
    pub avg_tokens_used: f64,
}

impl StoredObject for QueryMetrics {
    fn table_name() -> &'static str {
        "query_metrics"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl QueryMetrics {
    pub async fn ensure_initialized(db: &SurrealDbClient) -> Result<Self, AppError> {
        let metrics = db.get_item::<Self>("current").await?;

        if metrics.is_none() {
            let created: Option<Self> = db
                .store_item(QueryMetrics {
                    id: "current".to_string(),
                    total_requests: 0,
                    cache_hits: 0,
                    cache_misses: 0,
                    total_latency_ms: 0,
                    total_tokens: 0,
                })
                .await?;
            return created.ok_or(AppError::Validation("Failed to initialize metrics".into()));
        }

        metrics.ok_or(AppError::Validation("Failed to initialize metrics".into()))
    }

    /// Records one completed request in a single atomic statement.
    pub async fn record_request(
        db: &SurrealDbClient,
        cache_hit: bool,
        latency_ms: i64,
        tokens_used: u32,
    ) -> Result<Self, AppError> {
        let updated: Option<Self> = db
            .client
            .query(
                "UPDATE type::thing('query_metrics', 'current') SET \
                 total_requests += 1, \
                 cache_hits += $hits, \
                 cache_misses += $misses, \
                 total_latency_ms += $latency_ms, \
                 total_tokens += $tokens \
                 RETURN AFTER",
            )
            .bind(("hits", i64::from(cache_hit)))
            .bind(("misses", i64::from(!cache_hit)))
            .bind(("latency_ms", latency_ms))
            .bind(("tokens", i64::from(tokens_used)))
            .await?
            .take(0)?;

        updated.ok_or(AppError::Validation("Failed to update metrics".into()))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if self.total_requests == 0 {
            return MetricsSnapshot {
                total_requests: 0,
                cache_hit_rate: 0.0,
                avg_latency_ms: 0.0,
                avg_tokens_used: 0.0,
            };
        }

        let requests = self.total_requests as f64;
        MetricsSnapshot {
            total_requests: self.total_requests,
            cache_hit_rate: self.cache_hits as f64 / requests,
            avg_latency_ms: self.total_latency_ms as f64 / requests,
            avg_tokens_used: self.total_tokens as f64 / requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn setup_db() -> SurrealDbClient {
        let database = &Uuid::new_v4().to_string();
        SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn test_metrics_initialization_is_idempotent() {
        let db = setup_db().await;

        let metrics = QueryMetrics::ensure_initialized(&db)
            .await
            .expect("Failed to initialize metrics");
        assert_eq!(metrics.id, "current");
        assert_eq!(metrics.total_requests, 0);

        let again = QueryMetrics::ensure_initialized(&db)
            .await
            .expect("Second initialization failed");
        assert_eq!(again.total_requests, 0);
    }

    #[tokio::test]
    async fn test_record_request_accumulates() {
        let db = setup_db().await;
        QueryMetrics::ensure_initialized(&db)
            .await
            .expect("Failed to initialize metrics");

        QueryMetrics::record_request(&db, false, 120, 40)
            .await
            .expect("Failed to record miss");
        let metrics = QueryMetrics::record_request(&db, true, 30, 0)
            .await
            .expect("Failed to record hit");

        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.total_latency_ms, 150);
        assert_eq!(metrics.total_tokens, 40);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert!((snapshot.cache_hit_rate - 0.5).abs() < f64::EPSILON);
        assert!((snapshot.avg_latency_ms - 75.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_snapshot_on_empty_counters() {
        let metrics = QueryMetrics {
            id: "current".to_string(),
            total_requests: 0,
            cache_hits: 0,
            cache_misses: 0,
            total_latency_ms: 0,
            total_tokens: 0,
        };

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert!((snapshot.cache_hit_rate - 0.0).abs() < f64::EPSILON);
    }
}
