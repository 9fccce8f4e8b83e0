// src/ingest/parsers/forum_search.rs
//! Q&A-forum search API (Algolia-style `hits[]`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ingest::parsers::usable_url;
use crate::ingest::types::{ParseLimits, RawRecord};
use crate::ingest::{normalize_text, truncate_chars};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: Option<String>,
    title: Option<String>,
    story_title: Option<String>,
    url: Option<String>,
    story_url: Option<String>,
    created_at: Option<String>,
    created_at_i: Option<i64>,
    points: Option<i64>,
    num_comments: Option<i64>,
    story_text: Option<String>,
}

pub fn parse(body: &str, limits: &ParseLimits, now: DateTime<Utc>) -> Result<Vec<RawRecord>> {
    let resp: SearchResponse = serde_json::from_str(body).context("parsing forum search json")?;

    let out = resp
        .hits
        .into_iter()
        .filter_map(|hit| to_record(hit, limits, now))
        .take(limits.max_records)
        .collect();
    Ok(out)
}

fn to_record(hit: Hit, limits: &ParseLimits, now: DateTime<Utc>) -> Option<RawRecord> {
    let url = hit
        .url
        .as_deref()
        .or(hit.story_url.as_deref())
        .and_then(usable_url)?;
    let title = normalize_text(hit.title.as_deref().or(hit.story_title.as_deref())?);
    if title.is_empty() {
        return None;
    }

    // The API already hands out an ISO timestamp; use it as-is.
    let published_at = hit
        .created_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| hit.created_at_i.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)))
        .unwrap_or(now);

    let summary = hit
        .story_text
        .as_deref()
        .map(normalize_text)
        .map(|s| truncate_chars(&s, limits.summary_max_chars))
        .unwrap_or_default();

    Some(RawRecord {
        native_id: hit.object_id.filter(|id| !id.trim().is_empty()),
        title,
        url,
        published_at,
        summary,
        score: hit.points,
        comments: hit.num_comments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hits_map_through_and_urlless_hits_are_skipped() {
        let body = r#"{"hits":[
 {"objectID":"1","title":"Show: thing","url":"https://a.example/x","created_at":"2025-03-01T12:00:00.000Z","points":42,"num_comments":7},
 {"objectID":"2","title":"Ask: no link","url":null,"created_at":"2025-03-01T11:00:00.000Z","points":3,"num_comments":1,"story_text":"question"},
 {"objectID":"3","title":"Bad","url":"javascript:alert(1)"}
]}"#;
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        let out = parse(body, &ParseLimits::default(), now).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].native_id.as_deref(), Some("1"));
        assert_eq!(out[0].score, Some(42));
        assert_eq!(out[0].comments, Some(7));
        assert_eq!(
            out[0].published_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_hits_array_is_empty_not_error() {
        let out = parse("{}", &ParseLimits::default(), Utc::now()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse("<html>", &ParseLimits::default(), Utc::now()).is_err());
    }
}
