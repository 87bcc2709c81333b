//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling. Vector similarity and full-text
//! search go through raw SQL since SeaORM has no pgvector/tsquery
//! support.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row shape returned by the search primitives.
///
/// `timestamp` is kept as text (`created_at::text`); parse tolerance is the
/// retrieval pipeline's concern, not the store's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub score: f64,
    pub metadata: serde_json::Value,
    pub timestamp: String,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Format a vector for a `$n::vector` SQL cast: "[1.0,2.0,...]"
    fn vector_literal(embedding: &[f32]) -> String {
        format!(
            "[{}]",
            embedding
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        )
    }

    fn map_hit_rows(rows: Vec<sea_orm::QueryResult>) -> Vec<MemoryHit> {
        rows.into_iter()
            .filter_map(|row| {
                Some(MemoryHit {
                    id: row.try_get("", "id").ok()?,
                    title: row.try_get("", "title").ok()?,
                    content: row.try_get("", "content").ok()?,
                    score: row.try_get("", "score").ok()?,
                    metadata: row.try_get("", "metadata").ok()?,
                    timestamp: row.try_get("", "timestamp").ok()?,
                })
            })
            .collect()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Conversation Operations
    // ========================================================================

    /// Persist a finished conversation. The embedding may be absent; the
    /// insights worker backfills NULL embeddings later.
    pub async fn save_conversation(
        &self,
        title: &str,
        transcript: &str,
        embedding: Option<&[f32]>,
        metadata: serde_json::Value,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let embedding_str = embedding.map(Self::vector_literal);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO conversations (id, title, full_transcript, embedding, metadata, created_at)
            VALUES ($1, $2, $3, $4::vector, $5, NOW())
            "#,
            vec![
                id.into(),
                title.into(),
                transcript.into(),
                embedding_str.into(),
                metadata.into(),
            ],
        );

        self.write_conn().execute(stmt).await?;

        Ok(id)
    }

    /// Find conversation by ID
    pub async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        ConversationEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List conversations newest-first with pagination
    pub async fn list_conversations(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Conversation>, u64)> {
        let paginator = ConversationEntity::find()
            .order_by_desc(ConversationColumn::CreatedAt)
            .paginate(self.read_conn(), limit);

        let total = paginator.num_items().await?;
        let conversations = paginator.fetch_page(offset / limit.max(1)).await?;

        Ok((conversations, total))
    }

    /// Conversations created at or after the given instant, newest-first
    pub async fn conversations_since(&self, since: DateTime<Utc>) -> Result<Vec<Conversation>> {
        ConversationEntity::find()
            .filter(ConversationColumn::CreatedAt.gte(since))
            .order_by_desc(ConversationColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Conversations whose embedding has not been computed yet, oldest-first
    pub async fn conversations_missing_embedding(
        &self,
        limit: u64,
    ) -> Result<Vec<Conversation>> {
        ConversationEntity::find()
            .filter(ConversationColumn::Embedding.is_null())
            .order_by_asc(ConversationColumn::CreatedAt)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Write a (re)computed embedding back to a conversation
    pub async fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE conversations SET embedding = $1::vector WHERE id = $2",
            vec![Self::vector_literal(embedding).into(), id.into()],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    // ========================================================================
    // Search Primitives
    // ========================================================================

    /// Vector similarity search with session exclusion.
    ///
    /// Excludes records of the live session whose turn_number is past the
    /// cutoff (a record without turn_number counts as turn 0). Scores are
    /// cosine similarities, `1 - (embedding <=> query)`.
    pub async fn vector_search(
        &self,
        embedding: &[f32],
        exclude_conversation_id: &str,
        exclude_turn_cutoff: i64,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                id,
                title,
                full_transcript AS content,
                1 - (embedding <=> $1::vector) AS score,
                metadata,
                created_at::text AS timestamp
            FROM conversations
            WHERE embedding IS NOT NULL
              AND NOT (
                  metadata->>'conversation_id' = $2
                  AND COALESCE((metadata->>'turn_number')::int, 0) > $3
              )
            ORDER BY embedding <=> $1::vector
            LIMIT $4
            "#,
            vec![
                Self::vector_literal(embedding).into(),
                exclude_conversation_id.into(),
                exclude_turn_cutoff.into(),
                (limit as i64).into(),
            ],
        );

        let rows = self.read_conn().query_all(stmt).await?;

        Ok(Self::map_hit_rows(rows))
    }

    /// Full-text keyword search with session exclusion.
    ///
    /// Uses web-search-style query parsing (implicit AND, quoted phrases).
    /// Scores are raw `ts_rank` values; rescaling is the caller's concern.
    pub async fn keyword_search(
        &self,
        query: &str,
        exclude_conversation_id: &str,
        exclude_turn_cutoff: i64,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                id,
                title,
                full_transcript AS content,
                ts_rank(search_vector, websearch_to_tsquery('english', $1))::float8 AS score,
                metadata,
                created_at::text AS timestamp
            FROM conversations
            WHERE search_vector @@ websearch_to_tsquery('english', $1)
              AND NOT (
                  metadata->>'conversation_id' = $2
                  AND COALESCE((metadata->>'turn_number')::int, 0) > $3
              )
            ORDER BY score DESC
            LIMIT $4
            "#,
            vec![
                query.into(),
                exclude_conversation_id.into(),
                exclude_turn_cutoff.into(),
                (limit as i64).into(),
            ],
        );

        let rows = self.read_conn().query_all(stmt).await?;

        Ok(Self::map_hit_rows(rows))
    }

    /// Nearest neighbors among conversations older than `before`, excluding
    /// one conversation. Used by the contradiction screen.
    pub async fn similar_conversations_before(
        &self,
        embedding: &[f32],
        before: DateTime<Utc>,
        exclude_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                id,
                title,
                full_transcript AS content,
                1 - (embedding <=> $1::vector) AS score,
                metadata,
                created_at::text AS timestamp
            FROM conversations
            WHERE embedding IS NOT NULL
              AND created_at < $2
              AND id <> $3
            ORDER BY embedding <=> $1::vector
            LIMIT $4
            "#,
            vec![
                Self::vector_literal(embedding).into(),
                before.into(),
                exclude_id.into(),
                (limit as i64).into(),
            ],
        );

        let rows = self.read_conn().query_all(stmt).await?;

        Ok(Self::map_hit_rows(rows))
    }

    // ========================================================================
    // Alert Operations
    // ========================================================================

    /// Create an insight alert
    pub async fn insert_alert(
        &self,
        alert_type: &str,
        title: &str,
        content: &str,
        related_conversation_ids: Vec<String>,
        severity: &str,
    ) -> Result<InsightAlert> {
        let now = chrono::Utc::now();

        let alert = InsightAlertActiveModel {
            id: Set(Uuid::new_v4()),
            alert_type: Set(alert_type.to_string()),
            title: Set(title.to_string()),
            content: Set(content.to_string()),
            related_conversation_ids: Set(related_conversation_ids),
            severity: Set(severity.to_string()),
            dismissed: Set(false),
            created_at: Set(now.into()),
            viewed_at: Set(None),
            dismissed_at: Set(None),
        };

        alert.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Non-dismissed alerts, newest-first
    pub async fn pending_alerts(&self, limit: u64) -> Result<Vec<InsightAlert>> {
        InsightAlertEntity::find()
            .filter(InsightAlertColumn::Dismissed.eq(false))
            .order_by_desc(InsightAlertColumn::CreatedAt)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Dismiss an alert; returns false when the id is unknown
    pub async fn dismiss_alert(&self, id: Uuid) -> Result<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE insight_alerts SET dismissed = TRUE, dismissed_at = NOW() WHERE id = $1",
            vec![id.into()],
        );

        let result = self.write_conn().execute(stmt).await?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Digest Operations
    // ========================================================================

    /// Persist a weekly digest
    pub async fn insert_digest(
        &self,
        week_start: chrono::NaiveDate,
        week_end: chrono::NaiveDate,
        conversation_count: i32,
        top_topics: Vec<String>,
        digest_content: &str,
    ) -> Result<WeeklyDigest> {
        let digest = WeeklyDigestActiveModel {
            id: Set(Uuid::new_v4()),
            week_start: Set(week_start),
            week_end: Set(week_end),
            conversation_count: Set(conversation_count),
            top_topics: Set(top_topics),
            digest_content: Set(digest_content.to_string()),
            emailed: Set(false),
            created_at: Set(chrono::Utc::now().into()),
        };

        digest.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// The most recent weekly digest
    pub async fn latest_digest(&self) -> Result<Option<WeeklyDigest>> {
        WeeklyDigestEntity::find()
            .order_by_desc(WeeklyDigestColumn::CreatedAt)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Creation time of the most recent digest, if any
    pub async fn last_digest_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .latest_digest()
            .await?
            .map(|digest| digest.created_at.with_timezone(&Utc)))
    }
}
