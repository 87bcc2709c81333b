//! SeaORM entity models
//!
//! Database entities for Recall

mod conversation;
mod insight_alert;
mod weekly_digest;

pub use conversation::{
    Entity as ConversationEntity,
    Model as Conversation,
    ActiveModel as ConversationActiveModel,
    Column as ConversationColumn,
};

pub use insight_alert::{
    Entity as InsightAlertEntity,
    Model as InsightAlert,
    ActiveModel as InsightAlertActiveModel,
    Column as InsightAlertColumn,
};

pub use weekly_digest::{
    Entity as WeeklyDigestEntity,
    Model as WeeklyDigest,
    ActiveModel as WeeklyDigestActiveModel,
    Column as WeeklyDigestColumn,
};
