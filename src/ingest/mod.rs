// src/ingest/mod.rs
pub mod aggregate;
pub mod fetcher;
pub mod parsers;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

pub use aggregate::{dedup_by_identity, identity_key, merge, sort_by_recency, AggregateOptions, Aggregator};
pub use fetcher::{FetchConfig, FetchError, SourceFetcher};
pub use types::{FeedItem, ParseLimits, RawRecord};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("aggregator_fetch_total", "Source fetches attempted.");
        describe_counter!(
            "aggregator_source_errors_total",
            "Source fetches that degraded to an empty result, by reason."
        );
        describe_counter!(
            "aggregator_items_total",
            "Items produced by sources before dedup."
        );
        describe_counter!(
            "aggregator_dedup_total",
            "Items dropped as cross-source duplicates."
        );
        describe_counter!(
            "aggregator_sink_errors_total",
            "Persistence hand-offs that failed."
        );
        describe_histogram!("aggregator_fetch_ms", "Per-source fetch time in milliseconds.");
        describe_histogram!("aggregator_parse_ms", "Per-source parse time in milliseconds.");
        describe_gauge!(
            "aggregator_last_run_ts",
            "Unix ts when fetch_all last completed."
        );
    });
}

/// Normalize an HTML fragment to plain text: strip tags, decode entities,
/// collapse whitespace, trim. Tags go first so escaped markup (`&lt;b&gt;`)
/// survives as literal text.
pub fn normalize_text(s: &str) -> String {
    // 1) Strip HTML tags (and comments)
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)<!--.*?-->|</?[a-z!][^>]*>").unwrap());
    let stripped = re_tags.replace_all(s, " ");

    // 2) HTML entity decode, once
    let mut out = html_escape::decode_html_entities(&stripped).to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. NBSP)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Cut to at most `max` chars, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// Feed dates: RFC 2822 first, then RFC 3339, then chrono's lenient RFC 2822
/// (named zones like `EST`).
pub fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    let parsed = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok();
    if let Some(dt) = parsed {
        return DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }
    DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
