use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{deserialize_datetime, deserialize_flexible_id, serialize_datetime, StoredObject};

/// A previously computed answer keyed by the question's fingerprint. Never
/// mutated after creation; invalidated by TTL or an explicit cache flush.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// The normalized question fingerprint.
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub answer: String,
    pub sources: Vec<String>,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime"
    )]
    pub created_at: DateTime<Utc>,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime"
    )]
    pub expires_at: DateTime<Utc>,
}

impl StoredObject for CacheEntry {
    fn table_name() -> &'static str {
        "cached_answer"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl CacheEntry {
    pub fn new(fingerprint: String, answer: String, sources: Vec<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: fingerprint,
            answer,
            sources,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let entry = CacheEntry::new(
            "fp".to_string(),
            "answer".to_string(),
            vec!["doc.md".to_string()],
            Duration::hours(1),
        );

        assert_eq!(entry.expires_at, entry.created_at + Duration::hours(1));
        assert!(!entry.is_expired_at(entry.created_at));
        assert!(!entry.is_expired_at(entry.expires_at - Duration::seconds(1)));
        assert!(entry.is_expired_at(entry.expires_at));
        assert!(entry.is_expired_at(entry.expires_at + Duration::seconds(1)));
    }
}
