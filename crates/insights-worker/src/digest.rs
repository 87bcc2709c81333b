//! Weekly digest generation
//!
//! Aggregates the past week of conversations into a stored digest: activity
//! stats, most active weekday, and top topics. Digests become due on Sunday
//! evenings, at most once per week.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc, Weekday};
use recall_common::config::InsightsConfig;
use recall_common::db::models::{Conversation, WeeklyDigest};
use recall_common::db::Repository;
use recall_common::errors::Result;
use recall_common::metrics;
use std::collections::HashMap;
use tracing::info;

/// Topics kept on the digest row
const TOP_TOPIC_COUNT: usize = 10;

/// A digest is due on Sunday at or after the configured local hour, when the
/// previous digest is at least `min_gap_days` old.
pub fn digest_due(
    now_local: DateTime<FixedOffset>,
    last_digest: Option<DateTime<Utc>>,
    due_hour: u32,
    min_gap_days: i64,
) -> bool {
    if now_local.weekday() != Weekday::Sun || now_local.hour() < due_hour {
        return false;
    }

    match last_digest {
        Some(last) => (now_local.with_timezone(&Utc) - last).num_days() >= min_gap_days,
        None => true,
    }
}

/// Topic keywords ranked by frequency across the week, ties alphabetical
pub fn aggregate_topics(conversations: &[Conversation]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for conversation in conversations {
        for topic in conversation.topics() {
            *counts.entry(topic).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    sorted
        .into_iter()
        .take(TOP_TOPIC_COUNT)
        .map(|(topic, _)| topic)
        .collect()
}

/// Weekday with the most conversations, ties alphabetical
pub fn most_active_day(conversations: &[Conversation]) -> Option<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for conversation in conversations {
        let day = conversation.created_at.format("%A").to_string();
        *counts.entry(day).or_insert(0) += 1;
    }

    let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    sorted.into_iter().next().map(|(day, _)| day)
}

/// Render the stored digest body
pub fn render_digest(
    week_start: chrono::NaiveDate,
    week_end: chrono::NaiveDate,
    conversation_count: usize,
    most_active: Option<&str>,
    topics: &[String],
) -> String {
    let avg_per_day = conversation_count as f64 / 7.0;

    let mut body = format!(
        "Weekly digest ({} to {})\n\nActivity:\n- {} conversations ({:.1} per day)\n",
        week_start, week_end, conversation_count, avg_per_day
    );

    if let Some(day) = most_active {
        body.push_str(&format!("- Most active day: {}\n", day));
    }

    if topics.is_empty() {
        body.push_str("\nNo recurring topics this week.\n");
    } else {
        body.push_str("\nTop topics:\n");
        for topic in topics {
            body.push_str(&format!("- {}\n", topic));
        }
    }

    body
}

/// Generates and persists weekly digests
pub struct DigestGenerator {
    repository: Repository,
    config: InsightsConfig,
}

impl DigestGenerator {
    pub fn new(repository: Repository, config: InsightsConfig) -> Self {
        Self { repository, config }
    }

    /// Whether a digest should be generated right now
    pub async fn is_due(&self, now_local: DateTime<FixedOffset>) -> Result<bool> {
        let last = self.repository.last_digest_at().await?;

        Ok(digest_due(
            now_local,
            last,
            self.config.digest_due_hour,
            self.config.digest_min_gap_days,
        ))
    }

    /// Aggregate the past seven days and persist a digest row. Returns None
    /// when the week had no conversations.
    pub async fn generate(&self, now: DateTime<Utc>) -> Result<Option<WeeklyDigest>> {
        let week_ago = now - Duration::days(7);
        let conversations = self.repository.conversations_since(week_ago).await?;

        if conversations.is_empty() {
            info!("No conversations in past week, skipping digest");
            return Ok(None);
        }

        let topics = aggregate_topics(&conversations);
        let most_active = most_active_day(&conversations);

        let week_start = week_ago.date_naive();
        let week_end = now.date_naive();

        let content = render_digest(
            week_start,
            week_end,
            conversations.len(),
            most_active.as_deref(),
            &topics,
        );

        let digest = self
            .repository
            .insert_digest(
                week_start,
                week_end,
                conversations.len() as i32,
                topics,
                &content,
            )
            .await?;

        metrics::record_digest();
        info!(digest = %digest.id, conversations = conversations.len(), "Weekly digest generated");

        Ok(Some(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn utc_fixed(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().fixed_offset()
    }

    fn make_conversation(
        topics: Vec<&str>,
        created_at: DateTime<Utc>,
    ) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            full_transcript: "User: hello".to_string(),
            embedding: None,
            metadata: serde_json::json!({ "topics": topics }),
            created_at: created_at.into(),
        }
    }

    #[test]
    fn test_digest_due_only_sunday_evening() {
        // 2026-08-02 is a Sunday
        assert!(digest_due(utc_fixed(2026, 8, 2, 19), None, 18, 6));
        assert!(digest_due(utc_fixed(2026, 8, 2, 18), None, 18, 6));
        // Too early on Sunday
        assert!(!digest_due(utc_fixed(2026, 8, 2, 17), None, 18, 6));
        // 2026-08-03 is a Monday
        assert!(!digest_due(utc_fixed(2026, 8, 3, 19), None, 18, 6));
    }

    #[test]
    fn test_digest_due_respects_min_gap() {
        let now = utc_fixed(2026, 8, 2, 19);
        let two_days_ago = Utc.with_ymd_and_hms(2026, 7, 31, 19, 0, 0).unwrap();
        let eight_days_ago = Utc.with_ymd_and_hms(2026, 7, 25, 19, 0, 0).unwrap();

        assert!(!digest_due(now, Some(two_days_ago), 18, 6));
        assert!(digest_due(now, Some(eight_days_ago), 18, 6));
    }

    #[test]
    fn test_aggregate_topics_ranks_by_frequency() {
        let now = Utc::now();
        let conversations = vec![
            make_conversation(vec!["dividend", "risk"], now),
            make_conversation(vec!["dividend"], now),
            make_conversation(vec!["growth"], now),
        ];

        let topics = aggregate_topics(&conversations);

        assert_eq!(topics[0], "dividend");
        // Single-count topics tie and sort alphabetically
        assert_eq!(topics[1], "growth");
        assert_eq!(topics[2], "risk");
    }

    #[test]
    fn test_most_active_day() {
        // 2026-08-03 Monday, 2026-08-04 Tuesday
        let monday = Utc.with_ymd_and_hms(2026, 8, 3, 10, 0, 0).unwrap();
        let tuesday = Utc.with_ymd_and_hms(2026, 8, 4, 10, 0, 0).unwrap();
        let conversations = vec![
            make_conversation(vec![], monday),
            make_conversation(vec![], monday),
            make_conversation(vec![], tuesday),
        ];

        assert_eq!(most_active_day(&conversations).as_deref(), Some("Monday"));
        assert!(most_active_day(&[]).is_none());
    }

    #[test]
    fn test_render_digest_sections() {
        let start = chrono::NaiveDate::from_ymd_opt(2026, 7, 26).unwrap();
        let end = chrono::NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();

        let body = render_digest(start, end, 14, Some("Monday"), &["dividend".to_string()]);

        assert!(body.contains("14 conversations (2.0 per day)"));
        assert!(body.contains("Most active day: Monday"));
        assert!(body.contains("- dividend"));

        let empty = render_digest(start, end, 3, None, &[]);
        assert!(empty.contains("No recurring topics"));
    }
}
