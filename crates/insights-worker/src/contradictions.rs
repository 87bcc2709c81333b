//! Contradiction screening
//!
//! Newly saved conversations are compared against older memory: embed the
//! conversation's lead statement, find its nearest neighbors among
//! conversations older than the lookback window, and raise an alert when a
//! neighbor is similar enough. The screen is conservative: one alert per
//! conversation at most, and only above the configured similarity floor.

use chrono::{DateTime, Duration, Utc};
use recall_common::config::InsightsConfig;
use recall_common::db::models::{Conversation, InsightAlert};
use recall_common::db::{MemoryHit, Repository};
use recall_common::embeddings::Embedder;
use recall_common::errors::Result;
use recall_common::metrics;
use std::sync::Arc;
use tracing::info;

/// Pick the nearest neighbor at or above the similarity floor. Hits arrive
/// ordered by descending similarity, so only the first can qualify.
pub fn nearest_above_threshold(hits: &[MemoryHit], threshold: f64) -> Option<&MemoryHit> {
    hits.first().filter(|hit| hit.score >= threshold)
}

/// Alert body linking the new statement with the conflicting memory
pub fn render_alert_content(statement: &str, hit: &MemoryHit) -> String {
    let date: String = hit.timestamp.chars().take(10).collect();

    format!(
        "Now: {}\n\nPast ({}): {}\n\nSimilarity: {:.2}",
        statement, date, hit.title, hit.score
    )
}

/// Screens conversations against older memory
pub struct ContradictionScreen {
    repository: Repository,
    embedder: Arc<dyn Embedder>,
    config: InsightsConfig,
}

impl ContradictionScreen {
    pub fn new(repository: Repository, embedder: Arc<dyn Embedder>, config: InsightsConfig) -> Self {
        Self {
            repository,
            embedder,
            config,
        }
    }

    /// Screen one conversation. Returns the raised alert, if any.
    pub async fn screen(
        &self,
        conversation: &Conversation,
        now: DateTime<Utc>,
    ) -> Result<Option<InsightAlert>> {
        let statement = conversation.title.as_str();
        if statement.trim().is_empty() {
            return Ok(None);
        }

        let embedding = self.embedder.embed(statement).await?;
        if embedding.iter().all(|v| *v == 0.0) {
            return Ok(None);
        }

        // Recent conversations are iteration, not contradiction; only look
        // past the lookback window
        let cutoff = now - Duration::days(self.config.contradiction_lookback_days);

        let hits = self
            .repository
            .similar_conversations_before(
                &embedding,
                cutoff,
                conversation.id,
                self.config.contradiction_neighbors,
            )
            .await?;

        let Some(nearest) =
            nearest_above_threshold(&hits, self.config.contradiction_similarity_threshold)
        else {
            return Ok(None);
        };

        let content = render_alert_content(statement, nearest);

        let alert = self
            .repository
            .insert_alert(
                "contradiction",
                "Potential contradiction detected",
                &content,
                vec![conversation.id.to_string(), nearest.id.to_string()],
                "medium",
            )
            .await?;

        metrics::record_alert("contradiction");
        info!(
            conversation = %conversation.id,
            related = %nearest.id,
            similarity = nearest.score,
            "Contradiction alert raised"
        );

        Ok(Some(alert))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make_hit(score: f64, title: &str) -> MemoryHit {
        MemoryHit {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: "Transcript".to_string(),
            score,
            metadata: serde_json::json!({}),
            timestamp: "2026-06-15 09:30:00+00".to_string(),
        }
    }

    #[test]
    fn test_threshold_gates_alerts() {
        let hits = vec![make_hit(0.65, "a"), make_hit(0.5, "b")];
        assert!(nearest_above_threshold(&hits, 0.7).is_none());

        let hits = vec![make_hit(0.72, "a"), make_hit(0.5, "b")];
        let nearest = nearest_above_threshold(&hits, 0.7).unwrap();
        assert_eq!(nearest.title, "a");
    }

    #[test]
    fn test_threshold_exact_boundary_qualifies() {
        let hits = vec![make_hit(0.7, "boundary")];
        assert!(nearest_above_threshold(&hits, 0.7).is_some());
    }

    #[test]
    fn test_no_hits_no_alert() {
        assert!(nearest_above_threshold(&[], 0.7).is_none());
    }

    #[test]
    fn test_render_alert_content() {
        let hit = make_hit(0.81234, "I prefer growth stocks over dividend payers");

        let content = render_alert_content("Dividend stocks are my whole strategy now", &hit);

        assert!(content.starts_with("Now: Dividend stocks"));
        assert!(content.contains("Past (2026-06-15):"));
        assert!(content.contains("Similarity: 0.81"));
    }
}
