//! Retrieval orchestrator
//!
//! Sequences the pipeline: embed query, run both candidate generators
//! concurrently, fuse, boost recency, then either return the pool (small
//! pools skip MMR) or run diversity selection. Every stage failure is caught
//! at this boundary and converted to an empty result list: "no memories
//! found" is a valid outcome, never a fatal error. No stage is retried.

use crate::{fusion, mmr, recency, KeywordGenerator, MemoryQuery, MemoryStore, RetrievedDocument, VectorGenerator};
use chrono::Utc;
use recall_common::config::RetrievalConfig;
use recall_common::embeddings::Embedder;
use recall_common::errors::Result;
use recall_common::metrics;
use std::sync::Arc;
use std::time::Instant;

/// The hybrid retrieval engine.
///
/// Construct once per process with an injected store and embedder, share via
/// `Arc`.
pub struct RetrievalEngine {
    vector: VectorGenerator,
    keyword: KeywordGenerator,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    /// Create a new engine over the given store and embedder
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            vector: VectorGenerator::new(store.clone(), config.vector_search_k),
            keyword: KeywordGenerator::new(store, config.keyword_search_k),
            embedder,
            config,
        }
    }

    /// Retrieve memories relevant to `query`, excluding recent turns of the
    /// live session identified by `current_conversation_id`.
    ///
    /// Never fails: any internal error degrades to an empty list.
    pub async fn retrieve(
        &self,
        query: &str,
        current_conversation_id: &str,
        current_turn_number: i64,
        top_k: Option<usize>,
    ) -> Vec<RetrievedDocument> {
        let start = Instant::now();

        match self
            .run_pipeline(query, current_conversation_id, current_turn_number, top_k)
            .await
        {
            Ok(results) => {
                metrics::record_retrieval(start.elapsed().as_secs_f64(), results.len());
                tracing::info!(
                    query_len = query.len(),
                    results = results.len(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Retrieved memories"
                );
                results
            }
            Err(e) => {
                metrics::record_retrieval(start.elapsed().as_secs_f64(), 0);
                tracing::error!(error = %e, "Memory retrieval failed, degrading to empty context");
                Vec::new()
            }
        }
    }

    async fn run_pipeline(
        &self,
        query: &str,
        current_conversation_id: &str,
        current_turn_number: i64,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedDocument>> {
        let top_k = top_k.unwrap_or(self.config.top_k);

        let query_embedding = self.embedder.embed(query).await?;

        let memory_query = MemoryQuery {
            text: query.to_string(),
            embedding: query_embedding,
            exclude_conversation_id: current_conversation_id.to_string(),
            exclude_turn_cutoff: current_turn_number - self.config.session_history_limit,
        };

        // The generators are independent; run them concurrently. Each one
        // degrades to an empty list on store failure.
        let (vector_results, keyword_results) = tokio::join!(
            self.vector.candidates(&memory_query),
            self.keyword.candidates(&memory_query),
        );

        let mut pool = fusion::fuse(vector_results, keyword_results);

        recency::apply_recency_boost(&mut pool, self.config.recency_boost_days, Utc::now());

        if pool.len() > top_k {
            mmr::select_diverse(
                pool,
                &memory_query.embedding,
                top_k,
                self.config.mmr_diversity,
                self.embedder.as_ref(),
            )
            .await
        } else {
            Ok(pool)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use recall_common::db::MemoryHit;
    use recall_common::errors::AppError;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeStore {
        vector_hits: Vec<MemoryHit>,
        keyword_hits: Vec<MemoryHit>,
        fail: bool,
        seen_cutoffs: Mutex<Vec<i64>>,
    }

    impl FakeStore {
        fn new(vector_hits: Vec<MemoryHit>, keyword_hits: Vec<MemoryHit>) -> Self {
            Self {
                vector_hits,
                keyword_hits,
                fail: false,
                seen_cutoffs: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                vector_hits: Vec::new(),
                keyword_hits: Vec::new(),
                fail: true,
                seen_cutoffs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MemoryStore for FakeStore {
        async fn vector_search(
            &self,
            _embedding: &[f32],
            _exclude_conversation_id: &str,
            exclude_turn_cutoff: i64,
            limit: usize,
        ) -> Result<Vec<MemoryHit>> {
            if self.fail {
                return Err(AppError::DatabaseConnection {
                    message: "pool exhausted".to_string(),
                });
            }
            self.seen_cutoffs.lock().unwrap().push(exclude_turn_cutoff);
            Ok(self.vector_hits.iter().take(limit).cloned().collect())
        }

        async fn keyword_search(
            &self,
            _query: &str,
            _exclude_conversation_id: &str,
            exclude_turn_cutoff: i64,
            limit: usize,
        ) -> Result<Vec<MemoryHit>> {
            if self.fail {
                return Err(AppError::DatabaseConnection {
                    message: "pool exhausted".to_string(),
                });
            }
            self.seen_cutoffs.lock().unwrap().push(exclude_turn_cutoff);
            Ok(self.keyword_hits.iter().take(limit).cloned().collect())
        }
    }

    /// Deterministic embedder: fixed vectors per exact text, zero otherwise
    struct StubEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        batch_calls: AtomicUsize,
    }

    impl StubEmbedder {
        fn new(vectors: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: vectors
                    .iter()
                    .map(|(text, vec)| (text.to_string(), vec.clone()))
                    .collect(),
                batch_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self
                .vectors
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0, 0.0]))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batch_calls.fetch_add(1, AtomicOrdering::SeqCst);
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
            2
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::EmbeddingError {
                message: "model unavailable".to_string(),
            })
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(AppError::EmbeddingError {
                message: "model unavailable".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn old_timestamp() -> String {
        (Utc::now() - Duration::days(60)).to_rfc3339()
    }

    fn make_hit(id: u128, content: &str, score: f64, timestamp: String) -> MemoryHit {
        MemoryHit {
            id: Uuid::from_u128(id),
            title: format!("conversation {}", id),
            content: content.to_string(),
            score,
            metadata: serde_json::json!({ "conversation_id": format!("session-{}", id) }),
            timestamp,
        }
    }

    fn engine_with(store: FakeStore, embedder: Arc<dyn Embedder>) -> RetrievalEngine {
        RetrievalEngine::new(Arc::new(store), embedder, RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_failing_store_degrades_to_empty() {
        let embedder = Arc::new(StubEmbedder::new(&[("query", vec![1.0, 0.0])]));
        let engine = engine_with(FakeStore::failing(), embedder);

        let results = engine.retrieve("query", "session-live", 5, None).await;

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_failing_embedder_degrades_to_empty() {
        let store = FakeStore::new(
            vec![make_hit(1, "m1", 0.9, old_timestamp())],
            Vec::new(),
        );
        let engine = engine_with(store, Arc::new(FailingEmbedder));

        let results = engine.retrieve("query", "session-live", 5, None).await;

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_exclusion_cutoff_is_turn_minus_history_limit() {
        let store = Arc::new(FakeStore::new(Vec::new(), Vec::new()));
        let embedder = Arc::new(StubEmbedder::new(&[("query", vec![1.0, 0.0])]));
        let engine = RetrievalEngine::new(
            store.clone(),
            embedder,
            RetrievalConfig::default(),
        );

        engine.retrieve("query", "session-live", 25, None).await;

        let cutoffs = store.seen_cutoffs.lock().unwrap();
        assert_eq!(cutoffs.len(), 2);
        assert!(cutoffs.iter().all(|&c| c == 15));
    }

    #[tokio::test]
    async fn test_small_pool_skips_mmr_and_keeps_boosted_order() {
        let now = Utc::now();
        let store = FakeStore::new(
            vec![
                // 0.5 * 1.2 = 0.6
                make_hit(1, "m1", 0.5, (now - Duration::days(2)).to_rfc3339()),
                // 0.55 * 1.0 = 0.55
                make_hit(2, "m2", 0.55, (now - Duration::days(60)).to_rfc3339()),
                // 0.58 * 1.1 = 0.638
                make_hit(3, "m3", 0.58, (now - Duration::days(20)).to_rfc3339()),
            ],
            Vec::new(),
        );
        let embedder = Arc::new(StubEmbedder::new(&[("query", vec![1.0, 0.0])]));
        let batch_counter = embedder.clone();
        let engine = engine_with(store, embedder);

        let results = engine.retrieve("query", "session-live", 5, None).await;

        let ids: Vec<Uuid> = results.iter().map(|d| d.id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(3), Uuid::from_u128(1), Uuid::from_u128(2)]
        );
        // MMR never ran, so no document embeddings were requested
        assert_eq!(batch_counter.batch_calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_top_k_override_bounds_results() {
        let hits: Vec<MemoryHit> = (1..=10)
            .map(|i| make_hit(i, "same", 1.0 - i as f64 * 0.05, old_timestamp()))
            .collect();
        let store = FakeStore::new(hits, Vec::new());
        let embedder = Arc::new(StubEmbedder::new(&[
            ("query", vec![1.0, 0.0]),
            ("same", vec![1.0, 0.0]),
        ]));
        let engine = engine_with(store, embedder);

        let results = engine.retrieve("query", "session-live", 5, Some(3)).await;

        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_result_count_is_min_of_top_k_and_candidates() {
        let hits: Vec<MemoryHit> = (1..=4)
            .map(|i| make_hit(i, "same", 0.9 - i as f64 * 0.1, old_timestamp()))
            .collect();
        let store = FakeStore::new(hits, Vec::new());
        let embedder = Arc::new(StubEmbedder::new(&[("query", vec![1.0, 0.0])]));
        let engine = engine_with(store, embedder);

        let results = engine.retrieve("query", "session-live", 5, None).await;

        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn test_retrieval_is_deterministic() {
        let hits: Vec<MemoryHit> = (1..=12)
            .map(|i| {
                make_hit(
                    i,
                    &format!("memory {}", i),
                    0.95 - i as f64 * 0.04,
                    old_timestamp(),
                )
            })
            .collect();
        let vectors: Vec<(String, Vec<f32>)> = (1..=12)
            .map(|i| {
                let sim = 0.95 - i as f32 * 0.04;
                (format!("memory {}", i), vec![sim, (1.0 - sim * sim).sqrt()])
            })
            .collect();
        let vector_refs: Vec<(&str, Vec<f32>)> = vectors
            .iter()
            .map(|(t, v)| (t.as_str(), v.clone()))
            .collect();

        let embedder = Arc::new(StubEmbedder::new(&vector_refs));
        let store = FakeStore::new(hits.clone(), Vec::new());
        let engine = engine_with(store, embedder.clone());

        let first = engine.retrieve("query", "session-live", 5, None).await;

        let store = FakeStore::new(hits, Vec::new());
        let engine = engine_with(store, embedder);
        let second = engine.retrieve("query", "session-live", 5, None).await;

        let first_ids: Vec<Uuid> = first.iter().map(|d| d.id).collect();
        let second_ids: Vec<Uuid> = second.iter().map(|d| d.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    // The concrete pipeline scenario: 12 vector matches with similarities
    // 0.95 down to 0.40, 8 keyword matches rescaling to 0.9 down to 0.2,
    // 5 overlapping ids. The fused pool holds 15 distinct entries, MMR runs
    // (15 > 6) and returns exactly 6, led by the top boosted document.
    #[tokio::test]
    async fn test_fusion_overlap_scenario_end_to_end() {
        let vector_hits: Vec<MemoryHit> = (1..=12)
            .map(|i| {
                make_hit(
                    i,
                    &format!("memory {}", i),
                    0.95 - (i - 1) as f64 * 0.05,
                    old_timestamp(),
                )
            })
            .collect();

        // Raw ts_rank values rescaling (rank / 0.3) to 0.9, 0.8, ... 0.2;
        // ids 8..=12 overlap with the vector set
        let keyword_hits: Vec<MemoryHit> = (0..8)
            .map(|i| {
                make_hit(
                    8 + i as u128,
                    &format!("memory {}", 8 + i),
                    0.27 - i as f64 * 0.03,
                    old_timestamp(),
                )
            })
            .collect();

        // Document similarity to the query tracks the boosted score order
        let vectors: Vec<(String, Vec<f32>)> = (1..=15)
            .map(|i| {
                let sim = 1.0 - i as f32 * 0.05;
                (format!("memory {}", i), vec![sim, (1.0 - sim * sim).sqrt()])
            })
            .collect();
        let mut vector_refs: Vec<(&str, Vec<f32>)> = vectors
            .iter()
            .map(|(t, v)| (t.as_str(), v.clone()))
            .collect();
        vector_refs.push(("query", vec![1.0, 0.0]));

        let store = FakeStore::new(vector_hits, keyword_hits);
        let embedder = Arc::new(StubEmbedder::new(&vector_refs));
        let engine = engine_with(store, embedder);

        let results = engine.retrieve("query", "session-live", 5, None).await;

        assert_eq!(results.len(), 6);

        let ids: HashSet<Uuid> = results.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), 6, "no duplicate source records");

        // First selection is the globally highest boosted-score document
        assert_eq!(results[0].id, Uuid::from_u128(1));

        // Overlapping ids carried their vector-derived score
        for doc in &results {
            if doc.id == Uuid::from_u128(8) {
                assert!((doc.score - 0.60).abs() < 1e-5);
                assert_eq!(doc.source, crate::RetrievalSource::Vector);
            }
        }
    }
}
