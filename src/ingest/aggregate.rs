// src/ingest/aggregate.rs
//! Fan-out/fan-in over the whole source set.
//!
//! Sources run with at most `max_concurrency` in flight and complete in any
//! order; results are put back in registry order before the cross-source dedup
//! so first-wins is deterministic run to run.

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::ensure_metrics_described;
use crate::ingest::fetcher::SourceFetcher;
use crate::ingest::types::FeedItem;
use crate::registry::SourceDescriptor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Cap on in-flight requests. `None` launches every source at once.
    pub max_concurrency: Option<usize>,
    /// Ceiling on the whole `fetch_all`; sources still pending contribute nothing.
    pub deadline: Option<Duration>,
}

pub struct Aggregator {
    fetcher: Arc<SourceFetcher>,
    opts: AggregateOptions,
}

impl Aggregator {
    pub fn new(fetcher: Arc<SourceFetcher>, opts: AggregateOptions) -> Self {
        Self { fetcher, opts }
    }

    pub fn options(&self) -> AggregateOptions {
        self.opts
    }

    /// Fetch every source concurrently, merge, dedup and sort newest first.
    /// Cannot fail; worst case is an empty list.
    pub async fn fetch_all(&self, sources: &[SourceDescriptor]) -> Vec<FeedItem> {
        if sources.is_empty() {
            return Vec::new();
        }
        ensure_metrics_described();

        let t0 = std::time::Instant::now();
        let limit = self
            .opts
            .max_concurrency
            .filter(|n| *n > 0)
            .unwrap_or(sources.len());
        let deadline = self
            .opts
            .deadline
            .map(|d| tokio::time::Instant::now() + d);

        // Boxed so the fan-out future stays `Send` for any borrow of `sources`.
        let pending: Vec<BoxFuture<'_, (usize, Vec<FeedItem>)>> = sources
            .iter()
            .enumerate()
            .map(|(idx, d)| async move { (idx, self.fetch_one(d, deadline).await) }.boxed())
            .collect();
        let mut done: Vec<(usize, Vec<FeedItem>)> =
            stream::iter(pending).buffer_unordered(limit).collect().await;
        done.sort_unstable_by_key(|(idx, _)| *idx);
        let per_source: Vec<Vec<FeedItem>> = done.into_iter().map(|(_, items)| items).collect();

        let responded = per_source.iter().filter(|v| !v.is_empty()).count();
        let merged = merge(per_source);

        gauge!("aggregator_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            target: "ingest",
            sources = sources.len(),
            responded,
            items = merged.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "fetch_all finished"
        );
        merged
    }

    async fn fetch_one(
        &self,
        descriptor: &SourceDescriptor,
        deadline: Option<tokio::time::Instant>,
    ) -> Vec<FeedItem> {
        let Some(at) = deadline else {
            return self.fetcher.fetch_source(descriptor).await;
        };
        match tokio::time::timeout_at(at, self.fetcher.fetch_source(descriptor)).await {
            Ok(items) => items,
            Err(_) => {
                tracing::warn!(
                    target: "ingest",
                    source = %descriptor.id,
                    "aggregate deadline reached; source skipped"
                );
                counter!("aggregator_source_errors_total", "reason" => "deadline").increment(1);
                Vec::new()
            }
        }
    }
}

/// Concatenate per-source lists (in the given order), dedup, sort by recency.
pub fn merge(per_source: Vec<Vec<FeedItem>>) -> Vec<FeedItem> {
    let all: Vec<FeedItem> = per_source.into_iter().flatten().collect();
    let mut items = dedup_by_identity(all);
    sort_by_recency(&mut items);
    items
}

/// Cross-source identity: the URL path, or the raw string if it won't parse.
pub fn identity_key(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => url.to_string(),
    }
}

/// Keep the first item per identity key.
pub fn dedup_by_identity(items: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    let before = items.len();
    let kept: Vec<FeedItem> = items
        .into_iter()
        .filter(|it| seen.insert(identity_key(&it.url)))
        .collect();
    counter!("aggregator_dedup_total").increment((before - kept.len()) as u64);
    kept
}

/// Newest first. Stable: equal timestamps keep their merge order.
pub fn sort_by_recency(items: &mut [FeedItem]) {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}
