// src/ingest/parsers/mod.rs
//! Wire-format parsers, one per `SourceKind`. Each turns a raw response body
//! into at most `ParseLimits::max_records` raw records.

pub mod feed;
pub mod forum_search;
pub mod link_aggregator;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::histogram;

use crate::ingest::types::{ParseLimits, RawRecord};
use crate::registry::{SourceDescriptor, SourceKind};

/// Dispatch on the descriptor's kind. `now` stands in for missing dates.
pub fn parse_body(
    descriptor: &SourceDescriptor,
    body: &str,
    limits: &ParseLimits,
    now: DateTime<Utc>,
) -> Result<Vec<RawRecord>> {
    let t0 = std::time::Instant::now();
    let out = match &descriptor.kind {
        SourceKind::Feed => {
            let base = url::Url::parse(&descriptor.endpoint).ok();
            feed::parse(body, base.as_ref(), limits, now)
        }
        SourceKind::ForumSearch => forum_search::parse(body, limits, now),
        SourceKind::LinkAggregator { .. } => {
            let home = descriptor.home_domain().unwrap_or_default();
            link_aggregator::parse(body, &home, limits, now)
        }
    };
    histogram!("aggregator_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    out
}

/// Absolute http(s) URL, or `None`.
pub(crate) fn usable_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let url = url::Url::parse(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| raw.to_string())
}
