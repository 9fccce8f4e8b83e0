//! Aggregator service binary entrypoint.
//! Loads registry + keyword tables, warms the snapshot cache, serves it over HTTP.

use std::sync::Arc;

use anyhow::Context;
use feed_aggregator::{
    api::{self, AppState},
    build_aggregator,
    cache::{spawn_warmer, FeedCache},
    metrics::Metrics,
    sink::{JsonFileSink, Persister},
    AggregatorConfig, KeywordTables, Registry,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ENV_SNAPSHOT_PATH: &str = "AGGREGATOR_SNAPSHOT_PATH";

/// LOG_FORMAT=json switches to JSON lines; RUST_LOG overrides the filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_aggregator=info,ingest=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AggregatorConfig::from_env();
    let registry = Registry::load_default().context("loading source registry")?;
    let tables = KeywordTables::load_default().context("loading keyword tables")?;
    tracing::info!(sources = registry.len(), bind = %cfg.bind, "starting aggregator");

    let metrics = Metrics::init()?;
    let aggregator = Arc::new(build_aggregator(&cfg, tables)?);

    let mut cache = FeedCache::new(aggregator, registry.sources().to_vec(), cfg.cache_ttl);
    if let Ok(path) = std::env::var(ENV_SNAPSHOT_PATH) {
        let (persister, mut failures) = Persister::new(Arc::new(JsonFileSink::new(path)));
        cache = cache.with_persister(persister);
        tokio::spawn(async move {
            while let Some(f) = failures.recv().await {
                tracing::error!(sink = f.sink, items = f.items, error = %f.error, "snapshot not persisted");
            }
        });
    }
    let cache = Arc::new(cache);
    spawn_warmer(cache.clone(), cfg.cache_ttl);

    let app = api::router(AppState {
        cache,
        metrics: Some(metrics.handle),
    });
    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("binding {}", cfg.bind))?;
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
