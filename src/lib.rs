// src/lib.rs
//! Multi-source content aggregation: fetch feeds, forum search results and
//! link-aggregator listings concurrently, normalize them into one item model,
//! classify, dedup across sources and merge newest first.

pub mod api;
pub mod cache;
pub mod classify;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod registry;
pub mod sink;

use std::sync::Arc;

pub use crate::classify::{Classification, Classifier, KeywordTables};
pub use crate::config::AggregatorConfig;
pub use crate::ingest::{Aggregator, FeedItem, SourceFetcher};
pub use crate::registry::{Category, Registry, SourceDescriptor, SourceKind, WireKind};

/// Wire classifier, fetcher and orchestrator from config and keyword tables.
pub fn build_aggregator(cfg: &AggregatorConfig, tables: KeywordTables) -> anyhow::Result<Aggregator> {
    let classifier = Arc::new(Classifier::new(Arc::new(tables)));
    let fetcher = Arc::new(SourceFetcher::new(cfg.fetch.clone(), classifier)?);
    Ok(Aggregator::new(fetcher, cfg.aggregate))
}
