// src/ingest/parsers/link_aggregator.rs
//! Link-aggregator listing (`data.children[].data`). Self-posts are dropped:
//! only outbound links make useful items.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ingest::parsers::usable_url;
use crate::ingest::types::{ParseLimits, RawRecord};
use crate::ingest::{normalize_text, truncate_chars};

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    #[serde(default)]
    is_self: bool,
    created_utc: Option<f64>,
    selftext: Option<String>,
    score: Option<i64>,
    num_comments: Option<i64>,
}

pub fn parse(
    body: &str,
    home_domain: &str,
    limits: &ParseLimits,
    now: DateTime<Utc>,
) -> Result<Vec<RawRecord>> {
    let listing: Listing = serde_json::from_str(body).context("parsing link aggregator json")?;

    let out = listing
        .data
        .children
        .into_iter()
        .filter_map(|c| to_record(c.data, home_domain, limits, now))
        .take(limits.max_records)
        .collect();
    Ok(out)
}

fn to_record(
    post: Post,
    home_domain: &str,
    limits: &ParseLimits,
    now: DateTime<Utc>,
) -> Option<RawRecord> {
    if post.is_self {
        return None;
    }
    let url = post.url.as_deref().and_then(usable_url)?;
    if points_home(&url, home_domain) {
        return None;
    }
    let title = normalize_text(post.title.as_deref()?);
    if title.is_empty() {
        return None;
    }

    let published_at = post
        .created_utc
        .filter(|s| s.is_finite())
        .and_then(|s| DateTime::<Utc>::from_timestamp(s.trunc() as i64, 0))
        .unwrap_or(now);

    let summary = post
        .selftext
        .as_deref()
        .map(normalize_text)
        .map(|s| truncate_chars(&s, limits.summary_max_chars))
        .unwrap_or_default();

    Some(RawRecord {
        native_id: post.id.filter(|id| !id.trim().is_empty()),
        title,
        url,
        published_at,
        summary,
        score: post.score,
        comments: post.num_comments,
    })
}

/// True when `url`'s host is `home` or one of its subdomains.
fn points_home(url: &str, home: &str) -> bool {
    if home.is_empty() {
        return false;
    }
    let Some(host) = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return false;
    };
    host == home || host.ends_with(&format!(".{home}"))
}
