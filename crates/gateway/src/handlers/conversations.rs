//! Conversation persistence handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::transcript::{self, ChatMessage};
use crate::AppState;
use recall_common::{
    errors::{AppError, Result},
    metrics,
};

/// Save request: the full message list of a finished session
#[derive(Debug, Deserialize, Validate)]
pub struct SaveConversationRequest {
    #[validate(length(min = 1, message = "at least one message is required"))]
    pub messages: Vec<ChatMessage>,

    /// Live session id; generated when absent
    pub conversation_id: Option<String>,

    /// Extra metadata merged into the stored bag
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct SaveConversationResponse {
    pub id: Uuid,
    pub title: String,
    pub embedded: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_list_limit")]
    pub limit: u64,
}

fn default_list_limit() -> u64 {
    20
}

#[derive(Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub topics: Vec<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct ListConversationsResponse {
    pub items: Vec<ConversationSummary>,
    pub total: u64,
}

#[derive(Serialize)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub title: String,
    pub full_transcript: String,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub embedded: bool,
}

/// Persist a finished conversation with its embedding and metadata.
///
/// An embedding failure does not fail the save: the record lands with a NULL
/// embedding and the insights worker backfills it.
pub async fn save_conversation(
    State(state): State<AppState>,
    Json(request): Json<SaveConversationRequest>,
) -> Result<Json<SaveConversationResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("messages".to_string()),
    })?;

    let now = Utc::now();
    let transcript_text = transcript::format_transcript(&request.messages);
    let title = transcript::derive_title(&request.messages)
        .unwrap_or_else(|| format!("Conversation {}", now.format("%Y-%m-%d %H:%M")));
    let topics = transcript::extract_topics(&transcript_text);

    let conversation_id = request
        .conversation_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let total_tokens: i64 = request
        .messages
        .iter()
        .filter_map(|m| m.tokens)
        .sum();

    let mut metadata = serde_json::json!({
        "conversation_id": conversation_id,
        "start_time": request.messages.first().and_then(|m| m.timestamp.clone())
            .unwrap_or_else(|| now.to_rfc3339()),
        "end_time": request.messages.last().and_then(|m| m.timestamp.clone())
            .unwrap_or_else(|| now.to_rfc3339()),
        "turn_number": request.messages.len(),
        "total_tokens": total_tokens,
        "topics": topics,
        "participants": ["user", "assistant"],
    });

    // Caller-provided keys win over the derived ones
    if let Some(serde_json::Value::Object(extra)) = request.metadata {
        if let Some(bag) = metadata.as_object_mut() {
            for (key, value) in extra {
                bag.insert(key, value);
            }
        }
    }

    let embed_start = std::time::Instant::now();
    let embedding = match state.embedder.embed(&transcript_text).await {
        Ok(vector) => {
            metrics::record_embedding(
                embed_start.elapsed().as_secs_f64(),
                state.embedder.model_name(),
                true,
            );
            Some(vector)
        }
        Err(e) => {
            metrics::record_embedding(
                embed_start.elapsed().as_secs_f64(),
                state.embedder.model_name(),
                false,
            );
            tracing::warn!(error = %e, "Embedding failed, saving without vector");
            None
        }
    };

    let id = state
        .repository
        .save_conversation(&title, &transcript_text, embedding.as_deref(), metadata)
        .await?;

    metrics::record_save();

    tracing::info!(
        conversation = %id,
        title = %title,
        turns = request.messages.len(),
        embedded = embedding.is_some(),
        "Conversation saved"
    );

    Ok(Json(SaveConversationResponse {
        id,
        title,
        embedded: embedding.is_some(),
    }))
}

/// List saved conversations, newest first
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListConversationsResponse>> {
    let limit = params.limit.clamp(1, 100);
    let (conversations, total) = state
        .repository
        .list_conversations(params.offset, limit)
        .await?;

    let items = conversations
        .into_iter()
        .map(|conv| ConversationSummary {
            id: conv.id,
            title: conv.title.clone(),
            topics: conv.topics(),
            created_at: conv.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(ListConversationsResponse { items, total }))
}

/// Fetch one conversation by id
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationResponse>> {
    let conversation = state
        .repository
        .find_conversation(id)
        .await?
        .ok_or_else(|| AppError::ConversationNotFound { id: id.to_string() })?;

    Ok(Json(ConversationResponse {
        id: conversation.id,
        title: conversation.title.clone(),
        full_transcript: conversation.full_transcript.clone(),
        metadata: conversation.metadata.clone(),
        created_at: conversation.created_at.to_rfc3339(),
        embedded: conversation.embedding.is_some(),
    }))
}
