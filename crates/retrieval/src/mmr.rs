//! Maximal Marginal Relevance selection
//!
//! Picks the final top-K from the boosted candidate pool, trading relevance
//! to the query against redundancy with what was already picked. Relevance
//! is the dot product between the query embedding and a document embedding
//! computed from a bounded content prefix; embeddings arrive pre-normalized
//! from the provider, so no re-normalization happens here.
//!
//! Output is in selection order: the top relevance pick leads, later picks
//! trade relevance for diversity, so score order is not preserved past
//! index 0.

use crate::RetrievedDocument;
use recall_common::embeddings::Embedder;
use recall_common::errors::Result;

/// Content prefix embedded per candidate. Embedding whole transcripts costs
/// too much for what the diversity signal needs.
const PREFIX_CHARS: usize = 500;

fn content_prefix(content: &str) -> &str {
    match content.char_indices().nth(PREFIX_CHARS) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Greedy MMR over the candidate pool.
///
/// First pick is the candidate most similar to the query; each following
/// pick maximizes `(1 - diversity) * relevance - diversity * redundancy`
/// where redundancy is the max similarity to any already-selected document.
/// Ties resolve to the first-encountered candidate, so selection is
/// deterministic for identical input.
pub async fn select_diverse(
    documents: Vec<RetrievedDocument>,
    query_embedding: &[f32],
    k: usize,
    diversity: f32,
    embedder: &dyn Embedder,
) -> Result<Vec<RetrievedDocument>> {
    if documents.len() <= k {
        return Ok(documents);
    }

    let prefixes: Vec<String> = documents
        .iter()
        .map(|doc| content_prefix(&doc.content).to_string())
        .collect();
    let doc_embeddings = embedder.embed_batch(&prefixes).await?;

    // Similarity of every candidate to the query, not its boosted score
    let similarities: Vec<f32> = doc_embeddings
        .iter()
        .map(|emb| dot(query_embedding, emb))
        .collect();

    let mut remaining: Vec<usize> = (0..documents.len()).collect();
    let mut selected: Vec<usize> = Vec::with_capacity(k);

    // Seed with the highest query similarity
    let mut best_pos = 0;
    for (pos, &idx) in remaining.iter().enumerate() {
        if similarities[idx] > similarities[remaining[best_pos]] {
            best_pos = pos;
        }
    }
    selected.push(remaining.remove(best_pos));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_mmr = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let relevance = similarities[idx];
            let redundancy = selected
                .iter()
                .map(|&sel| dot(&doc_embeddings[idx], &doc_embeddings[sel]))
                .fold(f32::NEG_INFINITY, f32::max);
            let mmr = (1.0 - diversity) * relevance - diversity * redundancy;

            if mmr > best_mmr {
                best_mmr = mmr;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    let mut by_index: Vec<Option<RetrievedDocument>> = documents.into_iter().map(Some).collect();

    Ok(selected
        .into_iter()
        .filter_map(|idx| by_index[idx].take())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetrievalSource;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// Maps exact content strings to fixed embeddings
    struct StubEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        dimension: usize,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self
                .vectors
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0; self.dimension]))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn model_name(&self) -> &str {
            "stub"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    fn make_doc(id: u128, content: &str, score: f32) -> RetrievedDocument {
        RetrievedDocument {
            id: Uuid::from_u128(id),
            title: format!("doc {}", id),
            content: content.to_string(),
            score,
            source: RetrievalSource::Vector,
            timestamp: "2026-08-01 10:00:00+00".to_string(),
            metadata: serde_json::json!({}),
        }
    }

    fn stub(vectors: &[(&str, Vec<f32>)]) -> StubEmbedder {
        StubEmbedder {
            vectors: vectors
                .iter()
                .map(|(text, vec)| (text.to_string(), vec.clone()))
                .collect(),
            dimension: 3,
        }
    }

    #[tokio::test]
    async fn test_pool_not_larger_than_k_returned_whole() {
        let docs = vec![make_doc(1, "a", 0.9), make_doc(2, "b", 0.8)];
        let embedder = stub(&[]);

        let picked = select_diverse(docs.clone(), &[1.0, 0.0, 0.0], 5, 0.3, &embedder)
            .await
            .unwrap();

        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].id, docs[0].id);
        assert_eq!(picked[1].id, docs[1].id);
    }

    #[tokio::test]
    async fn test_first_pick_is_most_query_similar() {
        let docs = vec![
            make_doc(1, "alpha", 0.99),
            make_doc(2, "beta", 0.5),
            make_doc(3, "gamma", 0.4),
        ];
        // beta is most similar to the query despite its lower boosted score
        let embedder = stub(&[
            ("alpha", vec![0.2, 0.9, 0.0]),
            ("beta", vec![1.0, 0.0, 0.0]),
            ("gamma", vec![0.0, 0.0, 1.0]),
        ]);

        let picked = select_diverse(docs, &[1.0, 0.0, 0.0], 2, 0.3, &embedder)
            .await
            .unwrap();

        assert_eq!(picked[0].id, Uuid::from_u128(2));
    }

    #[tokio::test]
    async fn test_diversity_avoids_near_duplicates() {
        let docs = vec![
            make_doc(1, "original", 0.9),
            make_doc(2, "duplicate", 0.85),
            make_doc(3, "different", 0.5),
        ];
        let embedder = stub(&[
            ("original", vec![1.0, 0.0, 0.0]),
            ("duplicate", vec![0.99, 0.1, 0.0]),
            ("different", vec![0.0, 1.0, 0.0]),
        ]);

        let picked = select_diverse(docs, &[1.0, 0.0, 0.0], 2, 0.5, &embedder)
            .await
            .unwrap();

        assert_eq!(picked[0].id, Uuid::from_u128(1));
        // The near-duplicate loses to the orthogonal document
        assert_eq!(picked[1].id, Uuid::from_u128(3));
    }

    #[tokio::test]
    async fn test_zero_diversity_is_pure_relevance() {
        let docs = vec![
            make_doc(1, "original", 0.9),
            make_doc(2, "duplicate", 0.85),
            make_doc(3, "different", 0.5),
        ];
        let embedder = stub(&[
            ("original", vec![1.0, 0.0, 0.0]),
            ("duplicate", vec![0.99, 0.1, 0.0]),
            ("different", vec![0.0, 1.0, 0.0]),
        ]);

        let picked = select_diverse(docs, &[1.0, 0.0, 0.0], 2, 0.0, &embedder)
            .await
            .unwrap();

        assert_eq!(picked[0].id, Uuid::from_u128(1));
        assert_eq!(picked[1].id, Uuid::from_u128(2));
    }

    #[tokio::test]
    async fn test_ties_resolve_to_first_encountered() {
        // Three identical candidates: selection must be stable across runs
        let docs = vec![
            make_doc(1, "same", 0.9),
            make_doc(2, "same", 0.9),
            make_doc(3, "same", 0.9),
        ];
        let embedder = stub(&[("same", vec![1.0, 0.0, 0.0])]);

        let picked = select_diverse(docs, &[1.0, 0.0, 0.0], 2, 0.3, &embedder)
            .await
            .unwrap();

        assert_eq!(picked[0].id, Uuid::from_u128(1));
        assert_eq!(picked[1].id, Uuid::from_u128(2));
    }

    #[tokio::test]
    async fn test_selects_exactly_k() {
        let docs: Vec<_> = (1..=10)
            .map(|i| make_doc(i, "same", 1.0 - i as f32 * 0.05))
            .collect();
        let embedder = stub(&[("same", vec![1.0, 0.0, 0.0])]);

        let picked = select_diverse(docs, &[1.0, 0.0, 0.0], 4, 0.3, &embedder)
            .await
            .unwrap();

        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn test_content_prefix_respects_char_boundaries() {
        let long: String = "é".repeat(600);
        let prefix = content_prefix(&long);
        assert_eq!(prefix.chars().count(), 500);

        let short = "short content";
        assert_eq!(content_prefix(short), short);
    }
}
