//! Insight alert entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "insight_alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Alert category, e.g. "contradiction"
    pub alert_type: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Conversations this alert links together
    pub related_conversation_ids: Vec<String>,

    /// low | medium | high
    pub severity: String,

    pub dismissed: bool,

    pub created_at: DateTimeWithTimeZone,

    pub viewed_at: Option<DateTimeWithTimeZone>,

    pub dismissed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
