//! Conversation entity
//!
//! One row per saved chat session. The `search_vector` tsvector column is a
//! generated column maintained by Postgres and is deliberately not mapped here.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Short label derived from the first user utterance
    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Newline-delimited turns with role labels and optional timestamps
    #[sea_orm(column_type = "Text")]
    pub full_transcript: String,

    /// pgvector embedding stored as text for SeaORM compatibility.
    /// Actual vector operations done via raw SQL.
    /// NULL until computed; backfilled by the insights worker.
    #[sea_orm(column_type = "Text", nullable)]
    pub embedding: Option<String>,

    /// Extensible metadata as JSONB: conversation_id, turn_number, topics,
    /// start/end timestamps, token totals
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse embedding from stored text format to Vec<f32>
    pub fn parse_embedding(&self) -> Option<Vec<f32>> {
        self.embedding.as_ref().and_then(|s| {
            // Format: "[1.0,2.0,3.0,...]"
            let inner = s.trim_start_matches('[').trim_end_matches(']');
            inner
                .split(',')
                .map(|v| v.trim().parse::<f32>().ok())
                .collect()
        })
    }

    /// The live session this record was saved from
    pub fn conversation_id(&self) -> Option<&str> {
        self.metadata.get("conversation_id").and_then(|v| v.as_str())
    }

    /// Turn count at save time; a missing value is treated as 0
    pub fn turn_number(&self) -> i64 {
        self.metadata
            .get("turn_number")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    /// Extracted topic keywords
    pub fn topics(&self) -> Vec<String> {
        self.metadata
            .get("topics")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_model(metadata: serde_json::Value) -> Model {
        Model {
            id: Uuid::new_v4(),
            title: "Test".to_string(),
            full_transcript: "User: hello".to_string(),
            embedding: Some("[0.1,0.2,0.3]".to_string()),
            metadata,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_parse_embedding() {
        let model = make_model(serde_json::json!({}));
        assert_eq!(model.parse_embedding(), Some(vec![0.1, 0.2, 0.3]));
    }

    #[test]
    fn test_missing_turn_number_defaults_to_zero() {
        let model = make_model(serde_json::json!({ "conversation_id": "abc" }));
        assert_eq!(model.turn_number(), 0);
        assert_eq!(model.conversation_id(), Some("abc"));
    }

    #[test]
    fn test_topics() {
        let model = make_model(serde_json::json!({ "topics": ["dividend", "risk"] }));
        assert_eq!(model.topics(), vec!["dividend", "risk"]);
    }
}
