//! Vector candidate generator
//!
//! Wraps the store's pgvector similarity search. Scores are cosine
//! similarities; for normalized natural-text embeddings these land in [0, 1].

use crate::{MemoryQuery, MemoryStore, RetrievalSource, RetrievedDocument};
use std::sync::Arc;

/// Candidate generator backed by vector nearest-neighbor search
pub struct VectorGenerator {
    store: Arc<dyn MemoryStore>,
    limit: usize,
}

impl VectorGenerator {
    /// Create a new vector generator with a candidate limit
    pub fn new(store: Arc<dyn MemoryStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Fetch up to `limit` candidates ordered by descending similarity.
    ///
    /// Store failures are recovered here: the generator logs and returns an
    /// empty list, never an error.
    pub async fn candidates(&self, query: &MemoryQuery) -> Vec<RetrievedDocument> {
        match self
            .store
            .vector_search(
                &query.embedding,
                &query.exclude_conversation_id,
                query.exclude_turn_cutoff,
                self.limit,
            )
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .map(|hit| {
                    let score = hit.score as f32;
                    RetrievedDocument::from_hit(hit, score, RetrievalSource::Vector)
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Vector search failed, returning no candidates");
                Vec::new()
            }
        }
    }
}
