//! Weekly digest entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "weekly_digests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub week_start: Date,

    pub week_end: Date,

    pub conversation_count: i32,

    /// Most frequent topic keywords across the week
    pub top_topics: Vec<String>,

    #[sea_orm(column_type = "Text")]
    pub digest_content: String,

    pub emailed: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
