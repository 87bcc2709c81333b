//! Result fusion
//!
//! Merges the two candidate lists by record identity. When a record shows up
//! in both, the vector-sourced entry wins: its similarity score is the
//! higher-fidelity signal. The merged list is re-sorted by score right away
//! so every later stage sees a descending pool.

use crate::RetrievedDocument;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Merge vector and keyword candidates into one deduplicated list, sorted
/// descending by score.
pub fn fuse(
    vector_results: Vec<RetrievedDocument>,
    keyword_results: Vec<RetrievedDocument>,
) -> Vec<RetrievedDocument> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(vector_results.len() + keyword_results.len());

    // Vector results first: they own the score on overlap
    for doc in vector_results {
        if seen.insert(doc.id) {
            merged.push(doc);
        }
    }

    for doc in keyword_results {
        if seen.insert(doc.id) {
            merged.push(doc);
        }
    }

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetrievalSource;
    use uuid::Uuid;

    fn make_doc(id: u128, score: f32, source: RetrievalSource) -> RetrievedDocument {
        RetrievedDocument {
            id: Uuid::from_u128(id),
            title: format!("Conversation {}", id),
            content: format!("Transcript {}", id),
            score,
            source,
            timestamp: "2026-08-01 10:00:00+00".to_string(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_fuse_dedupes_by_id() {
        let vector = vec![
            make_doc(1, 0.9, RetrievalSource::Vector),
            make_doc(2, 0.8, RetrievalSource::Vector),
        ];
        let keyword = vec![
            make_doc(2, 0.5, RetrievalSource::Keyword),
            make_doc(3, 0.4, RetrievalSource::Keyword),
        ];

        let fused = fuse(vector, keyword);

        assert_eq!(fused.len(), 3);
        let ids: HashSet<_> = fused.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_fuse_prefers_vector_entry_on_overlap() {
        let vector = vec![make_doc(7, 0.62, RetrievalSource::Vector)];
        let keyword = vec![make_doc(7, 0.95, RetrievalSource::Keyword)];

        let fused = fuse(vector, keyword);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].source, RetrievalSource::Vector);
        assert!((fused[0].score - 0.62).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_sorts_descending() {
        let vector = vec![
            make_doc(1, 0.4, RetrievalSource::Vector),
            make_doc(2, 0.9, RetrievalSource::Vector),
        ];
        let keyword = vec![make_doc(3, 0.7, RetrievalSource::Keyword)];

        let fused = fuse(vector, keyword);

        let scores: Vec<f32> = fused.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.4]);
    }

    #[test]
    fn test_fuse_empty_inputs() {
        assert!(fuse(Vec::new(), Vec::new()).is_empty());
    }

    // 12 vector matches (0.95 down to 0.40), 8 keyword matches (0.9 down to
    // 0.2), 5 shared ids: the fused pool must hold 15 distinct entries, each
    // overlap carrying its vector-derived score.
    #[test]
    fn test_fuse_overlap_scenario() {
        let vector: Vec<_> = (0..12)
            .map(|i| make_doc(i as u128 + 1, 0.95 - 0.05 * i as f32, RetrievalSource::Vector))
            .collect();

        // Keyword ids 8..=12 overlap with the vector set; 13..=15 are new
        let keyword: Vec<_> = (0..8)
            .map(|i| make_doc(i as u128 + 8, 0.9 - 0.1 * i as f32, RetrievalSource::Keyword))
            .collect();

        let fused = fuse(vector.clone(), keyword);

        assert_eq!(fused.len(), 15);

        let ids: HashSet<_> = fused.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), 15);

        for original in &vector {
            let fused_doc = fused.iter().find(|d| d.id == original.id).unwrap();
            assert_eq!(fused_doc.source, RetrievalSource::Vector);
            assert!((fused_doc.score - original.score).abs() < 1e-6);
        }

        for window in fused.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
    }
}
