// src/ingest/fetcher.rs
//! One network call per source, then parse + classify. Never fails outward:
//! every error degrades to an empty result and is logged/counted here.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::classify::Classifier;
use crate::ingest::ensure_metrics_described;
use crate::ingest::parsers::parse_body;
use crate::ingest::types::{FeedItem, ParseLimits, RawRecord};
use crate::registry::{SourceDescriptor, WireKind};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_USER_AGENT: &str = concat!("feed-aggregator/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub limits: ParseLimits,
    /// Bodies larger than this are rejected as unparseable.
    pub max_body_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            limits: ParseLimits::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Why a source contributed nothing this cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("payload parsing failed: {0:#}")]
    Parse(anyhow::Error),
}

impl FetchError {
    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Http(_) => "http",
            FetchError::Status(_) => "status",
            FetchError::Parse(_) => "parse",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(e)
        }
    }
}

pub struct SourceFetcher {
    client: reqwest::Client,
    cfg: FetchConfig,
    classifier: Arc<Classifier>,
}

impl SourceFetcher {
    pub fn new(cfg: FetchConfig, classifier: Arc<Classifier>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout)
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            cfg,
            classifier,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.cfg
    }

    /// Fetch, parse and classify one source. Empty on any failure.
    pub async fn fetch_source(&self, descriptor: &SourceDescriptor) -> Vec<FeedItem> {
        ensure_metrics_described();
        counter!("aggregator_fetch_total").increment(1);

        let t0 = Instant::now();
        let res = self.try_fetch(descriptor).await;
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("aggregator_fetch_ms").record(ms);

        match res {
            Ok(items) => {
                tracing::debug!(
                    target: "ingest",
                    source = %descriptor.id,
                    items = items.len(),
                    elapsed_ms = ms as u64,
                    "source fetched"
                );
                counter!("aggregator_items_total").increment(items.len() as u64);
                items
            }
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    source = %descriptor.id,
                    reason = e.reason(),
                    error = %e,
                    "source degraded to empty"
                );
                counter!("aggregator_source_errors_total", "reason" => e.reason()).increment(1);
                Vec::new()
            }
        }
    }

    /// Same as `fetch_source` but keeps the failure.
    pub async fn try_fetch(&self, descriptor: &SourceDescriptor) -> Result<Vec<FeedItem>, FetchError> {
        let resp = self.client.get(&descriptor.endpoint).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = read_capped(resp, self.cfg.max_body_bytes).await?;
        self.items_from_body(descriptor, &body, Utc::now())
            .map_err(FetchError::Parse)
    }

    /// Parse + classify a body already in hand. No I/O.
    pub fn items_from_body(
        &self,
        descriptor: &SourceDescriptor,
        body: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<FeedItem>> {
        let records = parse_body(descriptor, body, &self.cfg.limits, now)?;
        Ok(records
            .into_iter()
            .map(|r| build_item(descriptor, r, &self.classifier))
            .collect())
    }
}

/// Read the body chunk by chunk, giving up once it passes `cap` bytes.
async fn read_capped(mut resp: reqwest::Response, cap: usize) -> Result<String, FetchError> {
    if let Some(len) = resp.content_length().filter(|n| *n > cap as u64) {
        return Err(FetchError::Parse(anyhow!(
            "declared body of {len} bytes exceeds the {cap} byte cap"
        )));
    }
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if buf.len() + chunk.len() > cap {
            return Err(FetchError::Parse(anyhow!("body exceeds the {cap} byte cap")));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Assemble an item from a raw record; classification comes from the
/// descriptor's default category and forced-topic bit.
pub fn build_item(descriptor: &SourceDescriptor, raw: RawRecord, classifier: &Classifier) -> FeedItem {
    let text = format!("{} {}", raw.title, raw.summary);
    let c = classifier.classify(&text, descriptor.category, descriptor.always_topic);
    let id = item_id(descriptor, &raw);

    FeedItem {
        id,
        title: raw.title,
        url: raw.url,
        source_id: descriptor.id.clone(),
        source_name: descriptor.name.clone(),
        source_kind: descriptor.kind.wire(),
        category: c.category,
        topic_tagged: c.topic_tagged,
        topic_score: c.topic_score,
        published_at: raw.published_at,
        summary: raw.summary,
        tags: Vec::new(),
        engagement_score: raw.score,
        engagement_comments: raw.comments,
    }
}

/// Deterministic id: feeds hash the URL under the source id; API kinds use
/// their native id under the kind prefix.
pub fn item_id(descriptor: &SourceDescriptor, raw: &RawRecord) -> String {
    match (descriptor.kind.wire(), raw.native_id.as_deref()) {
        (WireKind::ForumSearch | WireKind::LinkAggregator, Some(native)) => {
            format!("{}-{}", descriptor.kind.wire().id_prefix(), native)
        }
        _ => format!("{}-{}", descriptor.id, url_hash(&raw.url)),
    }
}

/// First 6 bytes of SHA-256 as lowercase hex.
pub(crate) fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::KeywordTables;
    use crate::registry::{Category, SourceKind};
    use chrono::TimeZone;

    fn descriptor(kind: SourceKind) -> SourceDescriptor {
        SourceDescriptor {
            id: "src".into(),
            name: "Src".into(),
            endpoint: "https://src.example/feed".into(),
            kind,
            category: Category::Science,
            always_topic: false,
        }
    }

    fn raw(native: Option<&str>) -> RawRecord {
        RawRecord {
            native_id: native.map(str::to_string),
            title: "OpenAI releases a new transformer-based model".into(),
            url: "https://story.example/42".into(),
            published_at: Utc.with_ymd_and_hms(2025, 5, 5, 0, 0, 0).unwrap(),
            summary: String::new(),
            score: Some(5),
            comments: None,
        }
    }

    #[test]
    fn ids_are_stable_and_kind_scoped() {
        let feed = descriptor(SourceKind::Feed);
        let a = item_id(&feed, &raw(None));
        let b = item_id(&feed, &raw(None));
        assert_eq!(a, b);
        assert!(a.starts_with("src-"));
        assert_eq!(a.len(), "src-".len() + 12);

        let forum = descriptor(SourceKind::ForumSearch);
        assert_eq!(item_id(&forum, &raw(Some("991"))), "forum-991");

        let links = descriptor(SourceKind::LinkAggregator { home_domain: None });
        assert_eq!(item_id(&links, &raw(Some("t3x"))), "links-t3x");
        // native id missing -> hashed form
        assert!(item_id(&links, &raw(None)).starts_with("src-"));
    }

    #[test]
    fn build_item_carries_classification_and_engagement() {
        let cls = Classifier::new(Arc::new(KeywordTables::embedded().unwrap()));
        let item = build_item(&descriptor(SourceKind::ForumSearch), raw(Some("1")), &cls);
        assert!(item.topic_tagged);
        assert_eq!(item.category, Category::Ai);
        assert_eq!(item.source_kind, WireKind::ForumSearch);
        assert_eq!(item.engagement_score, Some(5));
        assert!(item.tags.is_empty());
    }

    #[test]
    fn fetch_error_reasons() {
        assert_eq!(FetchError::Timeout.reason(), "timeout");
        assert_eq!(FetchError::Status(503).reason(), "status");
        assert_eq!(FetchError::Parse(anyhow::anyhow!("x")).reason(), "parse");
    }
}
