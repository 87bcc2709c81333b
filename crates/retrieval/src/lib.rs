//! Hybrid memory retrieval engine
//!
//! Selects past conversation fragments as context for a new chat turn by
//! combining four stages:
//! - Candidate generation: vector similarity + keyword full-text search
//! - Fusion: identity-deduplicated merge preferring vector-sourced scores
//! - Recency re-weighting: tiered multiplicative boost for newer memories
//! - MMR diversity selection: greedy top-K trading relevance vs redundancy
//!
//! The engine never fails: any stage error degrades to an empty result so
//! the conversation turn can proceed without memory context.

mod engine;
mod fusion;
mod keyword;
mod mmr;
mod recency;
mod vector;

pub use engine::RetrievalEngine;
pub use fusion::fuse;
pub use keyword::KeywordGenerator;
pub use mmr::select_diverse;
pub use recency::apply_recency_boost;
pub use vector::VectorGenerator;

use async_trait::async_trait;
use recall_common::db::{MemoryHit, Repository};
use recall_common::errors::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which candidate generator produced a document. Informational only; it
/// never gates a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    /// Vector similarity search
    Vector,
    /// Keyword full-text search
    Keyword,
}

/// A retrieved conversation fragment, transient per retrieval call.
///
/// `score` is unit-less and lands roughly in [0, 1.3] after recency
/// boosting; scores from different sources are not calibrated against each
/// other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub score: f32,
    pub source: RetrievalSource,
    /// Passthrough from the source record, as stored text; may be
    /// unparsable, in which case recency boosting skips the document
    pub timestamp: String,
    pub metadata: serde_json::Value,
}

impl RetrievedDocument {
    fn from_hit(hit: MemoryHit, score: f32, source: RetrievalSource) -> Self {
        Self {
            id: hit.id,
            title: hit.title,
            content: hit.content,
            score,
            source,
            timestamp: hit.timestamp,
            metadata: hit.metadata,
        }
    }
}

/// A prepared retrieval query: the raw text, its embedding, and the
/// live-session exclusion pair.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    pub text: String,
    pub embedding: Vec<f32>,
    /// The live session being retrieved for
    pub exclude_conversation_id: String,
    /// Same-session records with turn_number above this stay out of the
    /// candidate pool ("future" turns are not memory yet)
    pub exclude_turn_cutoff: i64,
}

/// The store capabilities the retrieval engine consumes.
///
/// Both primitives apply the session exclusion predicate and return scored
/// rows in their own native scale (cosine similarity, raw ts_rank).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn vector_search(
        &self,
        embedding: &[f32],
        exclude_conversation_id: &str,
        exclude_turn_cutoff: i64,
        limit: usize,
    ) -> Result<Vec<MemoryHit>>;

    async fn keyword_search(
        &self,
        query: &str,
        exclude_conversation_id: &str,
        exclude_turn_cutoff: i64,
        limit: usize,
    ) -> Result<Vec<MemoryHit>>;
}

#[async_trait]
impl MemoryStore for Repository {
    async fn vector_search(
        &self,
        embedding: &[f32],
        exclude_conversation_id: &str,
        exclude_turn_cutoff: i64,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        Repository::vector_search(self, embedding, exclude_conversation_id, exclude_turn_cutoff, limit)
            .await
    }

    async fn keyword_search(
        &self,
        query: &str,
        exclude_conversation_id: &str,
        exclude_turn_cutoff: i64,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        Repository::keyword_search(self, query, exclude_conversation_id, exclude_turn_cutoff, limit)
            .await
    }
}
