//! Transcript helpers for the conversation save path
//!
//! Formats message lists into the stored transcript shape, derives the
//! conversation title from the first user utterance, and extracts topic
//! keywords for the metadata bag.

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Maximum title length in characters
const TITLE_MAX_CHARS: usize = 100;

/// Maximum number of extracted topics
const MAX_TOPICS: usize = 5;

/// Domain keywords counted as topics
const TOPIC_KEYWORDS: &[&str] = &[
    "dividend", "dividends", "stock", "stocks", "portfolio", "allocation",
    "risk", "investing", "investment", "bonds", "equity", "value",
    "growth", "income", "retirement", "diversification", "market",
    "analysis", "valuation", "yield", "returns", "strategy",
];

/// One chat turn as submitted by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub tokens: Option<i64>,
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => "Unknown".to_string(),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format messages into the stored transcript: one line per turn with a role
/// label and, when the timestamp parses, a time prefix; turns separated by a
/// blank line.
pub fn format_transcript(messages: &[ChatMessage]) -> String {
    let mut lines = Vec::with_capacity(messages.len());

    for msg in messages {
        let role = capitalize(&msg.role);

        match msg.timestamp.as_deref().and_then(parse_timestamp) {
            Some(dt) => lines.push(format!(
                "[{}] {}: {}",
                dt.format("%Y-%m-%d %H:%M:%S"),
                role,
                msg.content
            )),
            None => lines.push(format!("{}: {}", role, msg.content)),
        }
    }

    lines.join("\n\n")
}

/// Title from the first non-empty user message, capped at 100 characters.
/// Returns None when no user message exists; the caller falls back to a
/// dated placeholder.
pub fn derive_title(messages: &[ChatMessage]) -> Option<String> {
    for msg in messages {
        if msg.role == "user" && !msg.content.is_empty() {
            let char_count = msg.content.chars().count();
            if char_count > TITLE_MAX_CHARS {
                let truncated: String = msg.content.chars().take(TITLE_MAX_CHARS - 3).collect();
                return Some(truncated + "...");
            }
            return Some(msg.content.clone());
        }
    }

    None
}

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[a-z0-9]+").expect("valid regex"))
}

/// Count domain keywords in the transcript and return the most frequent,
/// ties broken alphabetically for determinism.
pub fn extract_topics(transcript: &str) -> Vec<String> {
    let lowered = transcript.to_lowercase();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for found in word_pattern().find_iter(&lowered) {
        if let Some(&keyword) = TOPIC_KEYWORDS.iter().find(|k| **k == found.as_str()) {
            *counts.entry(keyword).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<(&str, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    sorted
        .into_iter()
        .take(MAX_TOPICS)
        .map(|(topic, _)| topic.to_string())
        .collect()
}
