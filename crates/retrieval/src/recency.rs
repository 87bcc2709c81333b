//! Recency re-weighting
//!
//! Tiered multiplicative boost rather than a continuous decay: fresh
//! memories (within `recency_boost_days`) get 1.2x, memories up to thirty
//! days old get 1.1x, everything older rides at 1.0x. A document whose
//! timestamp cannot be parsed keeps its score untouched; it is never
//! dropped.

use crate::RetrievedDocument;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;

const RECENT_BOOST: f32 = 1.2;
const MID_BOOST: f32 = 1.1;
const MID_WINDOW_DAYS: i64 = 30;

/// Boost factor for a memory of the given age
fn boost_factor(age: Duration, recency_boost_days: i64) -> f32 {
    if age <= Duration::days(recency_boost_days) {
        RECENT_BOOST
    } else if age <= Duration::days(MID_WINDOW_DAYS) {
        MID_BOOST
    } else {
        1.0
    }
}

/// Parse a stored timestamp. Accepts RFC 3339 and the `timestamptz::text`
/// form Postgres emits ("2026-08-01 10:00:00.123+00").
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

/// Apply the recency boost to every document and re-sort the pool by the
/// boosted scores, descending.
pub fn apply_recency_boost(
    documents: &mut Vec<RetrievedDocument>,
    recency_boost_days: i64,
    now: DateTime<Utc>,
) {
    for doc in documents.iter_mut() {
        // Unparsable timestamp: keep the document, skip the boost
        let Some(timestamp) = parse_timestamp(&doc.timestamp) else {
            continue;
        };

        let age = now - timestamp;
        doc.score *= boost_factor(age, recency_boost_days);
    }

    documents.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}
