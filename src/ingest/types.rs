// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::registry::{Category, WireKind};

/// One candidate record straight out of a parser. Consumed by classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Source-native id (forum objectID, link-aggregator post id). Feeds have none.
    pub native_id: Option<String>,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub summary: String,
    pub score: Option<i64>,
    pub comments: Option<i64>,
}

/// Normalized item handed across the boundary. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source_id: String,
    pub source_name: String,
    pub source_kind: WireKind,
    pub category: Category,
    pub topic_tagged: bool,
    pub topic_score: u8, // 1..=10
    pub published_at: DateTime<Utc>,
    pub summary: String,
    /// Always empty at ingestion; filled downstream.
    #[serde(default)]
    pub tags: Vec<String>,
    pub engagement_score: Option<i64>,
    pub engagement_comments: Option<i64>,
}

/// Record-count and summary-length caps applied by every parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub max_records: usize,
    pub summary_max_chars: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_records: 15,
            summary_max_chars: 300,
        }
    }
}
