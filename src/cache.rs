// src/cache.rs
//! Snapshot cache in front of `Aggregator::fetch_all`.
//!
//! A miss (empty or older than the TTL) triggers one refresh; concurrent
//! callers wait on the same refresh instead of fanning out again.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::ingest::{Aggregator, FeedItem};
use crate::registry::{Category, SourceDescriptor};
use crate::sink::Persister;

pub const MAX_PER_PAGE: usize = 100;
pub const DEFAULT_PER_PAGE: usize = 30;

struct Snapshot {
    items: Arc<Vec<FeedItem>>,
    taken_at: Instant,
}

pub struct FeedCache {
    aggregator: Arc<Aggregator>,
    sources: Arc<[SourceDescriptor]>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    refresh: Mutex<()>,
    persister: Option<Persister>,
}

impl FeedCache {
    pub fn new(aggregator: Arc<Aggregator>, sources: Vec<SourceDescriptor>, ttl: Duration) -> Self {
        Self {
            aggregator,
            sources: sources.into(),
            ttl,
            snapshot: RwLock::new(None),
            refresh: Mutex::new(()),
            persister: None,
        }
    }

    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    fn fresh(&self) -> Option<Arc<Vec<FeedItem>>> {
        let guard = self
            .snapshot
            .read()
            .unwrap_or_else(|poison| poison.into_inner());
        guard
            .as_ref()
            .filter(|s| s.taken_at.elapsed() < self.ttl)
            .map(|s| s.items.clone())
    }

    fn store(&self, items: Arc<Vec<FeedItem>>) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        *guard = Some(Snapshot {
            items,
            taken_at: Instant::now(),
        });
    }

    /// Cached items, refreshing on a miss.
    pub async fn get_or_refresh(&self) -> Arc<Vec<FeedItem>> {
        if let Some(items) = self.fresh() {
            return items;
        }
        let _guard = self.refresh.lock().await;
        // someone else may have refreshed while we waited
        if let Some(items) = self.fresh() {
            return items;
        }
        self.refresh_now().await
    }

    /// Unconditional refresh.
    pub async fn refresh_now(&self) -> Arc<Vec<FeedItem>> {
        let items = Arc::new(self.aggregator.fetch_all(&self.sources).await);
        self.store(items.clone());
        if let Some(p) = &self.persister {
            p.persist(items.as_ref().clone());
        }
        items
    }

    /// Seed the cache without fetching.
    pub fn prime(&self, items: Vec<FeedItem>) {
        self.store(Arc::new(items));
    }

    pub fn invalidate(&self) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        *guard = None;
    }
}

/// Keep the cache warm: refresh every `every`, first tick immediately.
pub fn spawn_warmer(cache: Arc<FeedCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = warm_interval(every);
        loop {
            ticker.tick().await;
            let _guard = cache.refresh.lock().await;
            let items = cache.refresh_now().await;
            tracing::info!(target: "cache", items = items.len(), "cache warmed");
        }
    })
}

// A refresh slower than `every` pushes the next tick back instead of
// queueing catch-up refreshes.
fn warm_interval(every: Duration) -> Interval {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub category: Option<Category>,
    /// 1-based
    pub page: usize,
    pub per_page: usize,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            category: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub items: Vec<FeedItem>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub has_more: bool,
}

/// Category filter + 1-based page slice over an already sorted list.
pub fn page(items: &[FeedItem], q: &PageQuery) -> Page {
    let per_page = q.per_page.clamp(1, MAX_PER_PAGE);
    let page = q.page.max(1);
    let filtered: Vec<&FeedItem> = items
        .iter()
        .filter(|it| q.category.map_or(true, |c| it.category == c))
        .collect();
    let total = filtered.len();
    let start = (page - 1).saturating_mul(per_page).min(total);
    let end = start.saturating_add(per_page).min(total);

    Page {
        items: filtered[start..end].iter().map(|it| (*it).clone()).collect(),
        page,
        per_page,
        total,
        has_more: end < total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WireKind;
    use chrono::Utc;

    fn item(id: &str, category: Category) -> FeedItem {
        FeedItem {
            id: id.into(),
            title: id.into(),
            url: format!("https://e.com/{id}"),
            source_id: "s".into(),
            source_name: "S".into(),
            source_kind: WireKind::Feed,
            category,
            topic_tagged: false,
            topic_score: 1,
            published_at: Utc::now(),
            summary: String::new(),
            tags: vec![],
            engagement_score: None,
            engagement_comments: None,
        }
    }

    #[test]
    fn pages_filter_by_category() {
        let items: Vec<_> = (0..7)
            .map(|i| {
                item(
                    &i.to_string(),
                    if i % 2 == 0 { Category::Ai } else { Category::Web },
                )
            })
            .collect();
        let q = PageQuery {
            category: Some(Category::Ai),
            page: 2,
            per_page: 3,
        };
        let p = page(&items, &q);
        assert_eq!(p.total, 4);
        assert_eq!(p.items.len(), 1);
        assert_eq!(p.items[0].id, "6");
        assert!(!p.has_more);
    }

    fn empty_cache() -> FeedCache {
        let agg = crate::build_aggregator(
            &crate::AggregatorConfig::default(),
            crate::KeywordTables::embedded().unwrap(),
        )
        .unwrap();
        FeedCache::new(Arc::new(agg), vec![], Duration::from_secs(300))
    }

    #[test]
    fn poisoned_snapshot_is_recovered_by_every_accessor() {
        let cache = Arc::new(empty_cache());
        cache.prime(vec![item("a", Category::Ai)]);

        let c = cache.clone();
        let _ = std::thread::spawn(move || {
            let _guard = c.snapshot.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(cache.snapshot.is_poisoned());

        assert_eq!(cache.fresh().map(|v| v.len()), Some(1));
        cache.invalidate();
        assert!(cache.fresh().is_none());
    }

    #[tokio::test]
    async fn warmer_interval_delays_after_slow_refresh() {
        let ticker = warm_interval(Duration::from_secs(5));
        assert_eq!(ticker.missed_tick_behavior(), MissedTickBehavior::Delay);
        assert_eq!(ticker.period(), Duration::from_secs(5));
    }

    #[test]
    fn out_of_range_page_is_empty_and_per_page_clamped() {
        let items = vec![item("a", Category::Ai)];
        let p = page(
            &items,
            &PageQuery {
                category: None,
                page: 9,
                per_page: 10_000,
            },
        );
        assert!(p.items.is_empty());
        assert_eq!(p.per_page, MAX_PER_PAGE);
        assert_eq!(p.total, 1);
    }
}
