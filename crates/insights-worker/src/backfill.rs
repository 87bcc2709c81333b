//! Embedding backfill
//!
//! Conversations can land without a vector (embedding outage at save time,
//! or a model upgrade that nulled the column). Each pass picks up a batch of
//! NULL-embedding rows, embeds their transcripts, and writes the vectors
//! back.

use recall_common::db::Repository;
use recall_common::embeddings::Embedder;
use recall_common::errors::Result;
use recall_common::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Backfills missing conversation embeddings in batches
pub struct EmbeddingBackfill {
    repository: Repository,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl EmbeddingBackfill {
    pub fn new(repository: Repository, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            repository,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed one batch of pending conversations. Returns how many vectors
    /// were written.
    pub async fn run_once(&self) -> Result<usize> {
        let pending = self
            .repository
            .conversations_missing_embedding(self.batch_size as u64)
            .await?;

        if pending.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = pending.iter().map(|c| c.full_transcript.clone()).collect();

        let start = Instant::now();
        let embeddings = match self.embedder.embed_batch(&texts).await {
            Ok(embeddings) => {
                metrics::record_embedding(
                    start.elapsed().as_secs_f64(),
                    self.embedder.model_name(),
                    true,
                );
                embeddings
            }
            Err(e) => {
                metrics::record_embedding(
                    start.elapsed().as_secs_f64(),
                    self.embedder.model_name(),
                    false,
                );
                return Err(e);
            }
        };

        let mut updated = 0;

        for (conversation, embedding) in pending.iter().zip(embeddings.into_iter()) {
            // A zero vector means the transcript was blank; leave the row
            // for inspection instead of storing a degenerate embedding
            if embedding.iter().all(|v| *v == 0.0) {
                warn!(conversation = %conversation.id, "Blank transcript, skipping embedding");
                continue;
            }

            self.repository
                .set_embedding(conversation.id, &embedding)
                .await?;
            updated += 1;
        }

        metrics::record_backfill(updated);
        info!(updated, pending = pending.len(), "Embedding backfill pass complete");

        Ok(updated)
    }
}
