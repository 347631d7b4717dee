use std::cmp::Ordering;

use common::storage::types::document_chunk::DocumentChunk;

pub fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Converts a cosine distance reported by the vector index into a similarity
/// score in `[0, 1]`.
pub fn distance_to_similarity(distance: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    clamp_unit(1.0 - distance)
}

/// Ordering for retrieval results: descending score, ties broken by ingestion
/// order (`created_at`, then offset, then id) so equal-scored chunks come back
/// in a stable order.
pub fn compare_scored(a: &(DocumentChunk, f32), b: &(DocumentChunk, f32)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.created_at.cmp(&b.0.created_at))
        .then_with(|| a.0.offset.cmp(&b.0.offset))
        .then_with(|| a.0.id.cmp(&b.0.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn chunk_at(offset: usize, seconds_ago: i64) -> DocumentChunk {
        DocumentChunk {
            id: format!("chunk-{offset}"),
            source_document: "doc.md".to_string(),
            text: "text".to_string(),
            embedding: vec![1.0, 0.0],
            offset,
            created_at: Utc::now() - Duration::seconds(seconds_ago),
        }
    }

    #[test]
    fn test_distance_to_similarity_clamps() {
        assert!((distance_to_similarity(0.0) - 1.0).abs() < 1e-6);
        assert!((distance_to_similarity(1.0) - 0.0).abs() < 1e-6);
        assert_eq!(distance_to_similarity(2.5), 0.0);
        assert_eq!(distance_to_similarity(f32::NAN), 0.0);
    }

    #[test]
    fn test_ordering_prefers_higher_score() {
        let high = (chunk_at(0, 10), 0.9);
        let low = (chunk_at(1, 5), 0.4);
        assert_eq!(compare_scored(&high, &low), Ordering::Less);
    }

    #[test]
    fn test_equal_scores_preserve_ingestion_order() {
        let older = (chunk_at(0, 60), 0.5);
        let newer = (chunk_at(1, 10), 0.5);
        assert_eq!(compare_scored(&older, &newer), Ordering::Less);

        let mut results = vec![newer.clone(), older.clone()];
        results.sort_by(compare_scored);
        assert_eq!(results[0].0.id, older.0.id);
        assert_eq!(results[1].0.id, newer.0.id);
    }

    #[test]
    fn test_full_ties_fall_back_to_id() {
        let created_at = Utc::now();
        let chunk = |id: &str| DocumentChunk {
            id: id.to_string(),
            source_document: format!("{id}.md"),
            text: "text".to_string(),
            embedding: vec![1.0, 0.0],
            offset: 0,
            created_at,
        };
        let a = (chunk("chunk-a"), 0.5);
        let b = (chunk("chunk-b"), 0.5);

        assert_eq!(compare_scored(&a, &b), Ordering::Less);

        let mut forward = vec![a.clone(), b.clone()];
        let mut reversed = vec![b, a];
        forward.sort_by(compare_scored);
        reversed.sort_by(compare_scored);
        assert_eq!(forward[0].0.id, reversed[0].0.id);
        assert_eq!(forward[1].0.id, reversed[1].0.id);
    }
}
