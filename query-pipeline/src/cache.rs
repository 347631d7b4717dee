use std::collections::HashMap;

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::cached_answer::CacheEntry},
};

/// TTL-bounded answer cache keyed by question fingerprint. The cache is
/// advisory: a failing backing store degrades to always-miss behavior and is
/// logged, never surfaced as a request error. Concurrent writers to the same
/// fingerprint are last-write-wins.
pub struct ResponseCache {
    inner: CacheInner,
    ttl: Duration,
}

enum CacheInner {
    Memory {
        entries: RwLock<HashMap<String, CacheEntry>>,
    },
    Database {
        db: Arc<SurrealDbClient>,
    },
}

impl ResponseCache {
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            inner: CacheInner::Memory {
                entries: RwLock::new(HashMap::new()),
            },
            ttl,
        }
    }

    pub fn database(db: Arc<SurrealDbClient>, ttl: Duration) -> Self {
        Self {
            inner: CacheInner::Database { db },
            ttl,
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            CacheInner::Memory { .. } => "memory",
            CacheInner::Database { .. } => "database",
        }
    }

    /// Looks up a live entry. Expired entries are misses and evicted lazily;
    /// backend failures degrade to a miss.
    pub async fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let now = Utc::now();

        match &self.inner {
            CacheInner::Memory { entries } => {
                let hit = entries.read().await.get(fingerprint).cloned();
                match hit {
                    Some(entry) if !entry.is_expired_at(now) => Some(entry),
                    Some(_) => {
                        entries.write().await.remove(fingerprint);
                        None
                    }
                    None => None,
                }
            }
            CacheInner::Database { db } => {
                match db.get_item::<CacheEntry>(fingerprint).await {
                    Ok(Some(entry)) if !entry.is_expired_at(now) => Some(entry),
                    Ok(Some(_)) => {
                        if let Err(e) = db.delete_item::<CacheEntry>(fingerprint).await {
                            debug!(error = %e, "Failed to evict expired cache entry");
                        }
                        None
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!(error = %e, "Cache backend unavailable; degrading to miss");
                        None
                    }
                }
            }
        }
    }

    /// Stores an answer under the fingerprint with expiry `now + ttl`.
    /// Backend failures are logged and swallowed.
    pub async fn put(&self, fingerprint: &str, answer: &str, sources: &[String]) {
        let entry = CacheEntry::new(
            fingerprint.to_owned(),
            answer.to_owned(),
            sources.to_vec(),
            self.ttl,
        );

        match &self.inner {
            CacheInner::Memory { entries } => {
                entries.write().await.insert(fingerprint.to_owned(), entry);
            }
            CacheInner::Database { db } => {
                if let Err(e) = db.upsert_item(entry).await {
                    warn!(error = %e, "Cache backend unavailable; answer not cached");
                }
            }
        }
    }

    /// Clears every entry.
    pub async fn flush(&self) -> Result<(), AppError> {
        match &self.inner {
            CacheInner::Memory { entries } => {
                entries.write().await.clear();
                Ok(())
            }
            CacheInner::Database { db } => {
                db.drop_table::<CacheEntry>()
                    .await
                    .map_err(|e| AppError::CacheUnavailable(e.to_string()))?;
                Ok(())
            }
        }
    }

    /// Whether the backing store currently answers requests.
    pub async fn healthy(&self) -> bool {
        match &self.inner {
            CacheInner::Memory { .. } => true,
            CacheInner::Database { db } => db.query("RETURN 1").await.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn database_cache(ttl: Duration) -> ResponseCache {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");
        ResponseCache::database(Arc::new(db), ttl)
    }

    fn sources() -> Vec<String> {
        vec!["policy.md".to_string(), "handbook.md".to_string()]
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let cache = ResponseCache::in_memory(Duration::hours(1));

        cache.put("fp-1", "the answer", &sources()).await;
        let entry = cache.get("fp-1").await.expect("expected a hit");

        assert_eq!(entry.answer, "the answer");
        assert_eq!(entry.sources, sources());
        assert_eq!(entry.expires_at, entry.created_at + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_database_round_trip() {
        let cache = database_cache(Duration::hours(1)).await;

        cache.put("fp-db", "stored answer", &sources()).await;
        let entry = cache.get("fp-db").await.expect("expected a hit");

        assert_eq!(entry.answer, "stored answer");
        assert_eq!(entry.sources, sources());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        // Zero TTL: the entry expires the moment it is written.
        let cache = ResponseCache::in_memory(Duration::zero());

        cache.put("fp-exp", "stale", &[]).await;
        assert!(cache.get("fp-exp").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_database_entry_is_a_miss() {
        let cache = database_cache(Duration::zero()).await;

        cache.put("fp-exp", "stale", &[]).await;
        assert!(cache.get("fp-exp").await.is_none());
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let cache = ResponseCache::in_memory(Duration::hours(1));

        cache.put("fp", "first", &[]).await;
        cache.put("fp", "second", &[]).await;

        let entry = cache.get("fp").await.expect("expected a hit");
        assert_eq!(entry.answer, "second");
    }

    #[tokio::test]
    async fn test_flush_clears_entries() {
        let cache = database_cache(Duration::hours(1)).await;

        cache.put("fp-a", "a", &[]).await;
        cache.put("fp-b", "b", &[]).await;
        cache.flush().await.expect("flush failed");

        assert!(cache.get("fp-a").await.is_none());
        assert!(cache.get("fp-b").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_fingerprint_is_a_miss() {
        let cache = ResponseCache::in_memory(Duration::hours(1));
        assert!(cache.get("never-stored").await.is_none());
    }
}
