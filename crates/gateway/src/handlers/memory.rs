//! Memory search handler
//!
//! Thin HTTP surface over the retrieval engine. An empty result list is a
//! normal outcome, including when retrieval degrades internally.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use recall_common::errors::{AppError, Result};
use recall_retrieval::RetrievalSource;

/// Memory search request
#[derive(Debug, Deserialize, Validate)]
pub struct MemorySearchRequest {
    #[validate(length(min = 1, max = 1000))]
    pub query: String,

    /// The live session issuing the query
    pub conversation_id: String,

    /// Current turn count of the live session
    pub turn_number: i64,

    /// Override for the configured top_k
    pub top_k: Option<usize>,
}

#[derive(Serialize)]
pub struct MemorySearchResponse {
    pub results: Vec<MemoryResult>,
    pub count: usize,
    pub processing_time_ms: u64,
}

#[derive(Serialize)]
pub struct MemoryResult {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub score: f32,
    pub source: RetrievalSource,
    pub timestamp: String,
}

/// Retrieve memories for a conversation turn
pub async fn search_memories(
    State(state): State<AppState>,
    Json(request): Json<MemorySearchRequest>,
) -> Result<Json<MemorySearchResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let results = state
        .engine
        .retrieve(
            &request.query,
            &request.conversation_id,
            request.turn_number,
            request.top_k,
        )
        .await;

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        query = %request.query,
        conversation_id = %request.conversation_id,
        results = results.len(),
        latency_ms = processing_time_ms,
        "Memory search completed"
    );

    let results: Vec<MemoryResult> = results
        .into_iter()
        .map(|doc| MemoryResult {
            id: doc.id,
            title: doc.title,
            content: doc.content,
            score: doc.score,
            source: doc.source,
            timestamp: doc.timestamp,
        })
        .collect();

    Ok(Json(MemorySearchResponse {
        count: results.len(),
        results,
        processing_time_ms,
    }))
}
