//! Insight alert and digest handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use recall_common::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct AlertParams {
    #[serde(default = "default_alert_limit")]
    pub limit: u64,
}

fn default_alert_limit() -> u64 {
    10
}

#[derive(Serialize)]
pub struct AlertResponse {
    pub id: Uuid,
    pub alert_type: String,
    pub title: String,
    pub content: String,
    pub related_conversation_ids: Vec<String>,
    pub severity: String,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct ListAlertsResponse {
    pub alerts: Vec<AlertResponse>,
}

#[derive(Serialize)]
pub struct DismissAlertResponse {
    pub id: Uuid,
    pub dismissed: bool,
}

#[derive(Serialize)]
pub struct DigestResponse {
    pub id: Uuid,
    pub week_start: String,
    pub week_end: String,
    pub conversation_count: i32,
    pub top_topics: Vec<String>,
    pub digest_content: String,
    pub created_at: String,
}

/// List pending (non-dismissed) alerts
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertParams>,
) -> Result<Json<ListAlertsResponse>> {
    let alerts = state
        .repository
        .pending_alerts(params.limit.clamp(1, 100))
        .await?;

    let alerts = alerts
        .into_iter()
        .map(|alert| AlertResponse {
            id: alert.id,
            alert_type: alert.alert_type,
            title: alert.title,
            content: alert.content,
            related_conversation_ids: alert.related_conversation_ids,
            severity: alert.severity,
            created_at: alert.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(ListAlertsResponse { alerts }))
}

/// Dismiss an alert by id
pub async fn dismiss_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DismissAlertResponse>> {
    let dismissed = state.repository.dismiss_alert(id).await?;

    if !dismissed {
        return Err(AppError::AlertNotFound { id: id.to_string() });
    }

    Ok(Json(DismissAlertResponse { id, dismissed }))
}

/// Fetch the most recent weekly digest
pub async fn latest_digest(State(state): State<AppState>) -> Result<Json<DigestResponse>> {
    let digest = state
        .repository
        .latest_digest()
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource_type: "weekly_digest".to_string(),
            id: "latest".to_string(),
        })?;

    Ok(Json(DigestResponse {
        id: digest.id,
        week_start: digest.week_start.to_string(),
        week_end: digest.week_end.to_string(),
        conversation_count: digest.conversation_count,
        top_topics: digest.top_topics,
        digest_content: digest.digest_content,
        created_at: digest.created_at.to_rfc3339(),
    }))
}
