//! Keyword candidate generator
//!
//! Wraps the store's full-text search (web-search-style query parsing:
//! implicit AND of terms, quoted phrases). Raw `ts_rank` values are rescaled
//! into a rough [0, 1] range before they meet vector scores downstream.

use crate::{MemoryQuery, MemoryStore, RetrievalSource, RetrievedDocument};
use std::sync::Arc;

/// Empirical normalization constant for ts_rank values. A heuristic, not a
/// calibration: typical ranks for matching transcripts cluster below 0.3.
const RANK_NORM: f64 = 0.3;

/// Rescale a raw full-text rank into [0, 1]
fn rescale_rank(rank: f64) -> f32 {
    (rank / RANK_NORM).min(1.0) as f32
}

/// Candidate generator backed by lexical relevance search
pub struct KeywordGenerator {
    store: Arc<dyn MemoryStore>,
    limit: usize,
}

impl KeywordGenerator {
    /// Create a new keyword generator with a candidate limit
    pub fn new(store: Arc<dyn MemoryStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Fetch up to `limit` candidates ordered by descending rank.
    ///
    /// Store failures are recovered here: the generator logs and returns an
    /// empty list, never an error.
    pub async fn candidates(&self, query: &MemoryQuery) -> Vec<RetrievedDocument> {
        match self
            .store
            .keyword_search(
                &query.text,
                &query.exclude_conversation_id,
                query.exclude_turn_cutoff,
                self.limit,
            )
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .map(|hit| {
                    let score = rescale_rank(hit.score);
                    RetrievedDocument::from_hit(hit, score, RetrievalSource::Keyword)
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Keyword search failed, returning no candidates");
                Vec::new()
            }
        }
    }
}
