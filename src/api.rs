// src/api.rs
//! Thin HTTP surface over the cached snapshot. Slicing and category filtering
//! only; rendering is someone else's job.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::cache::{page, FeedCache, PageQuery, DEFAULT_PER_PAGE};
use crate::registry::{Category, SourceDescriptor};

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<FeedCache>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/items", get(items))
        .route("/sources", get(sources))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ItemsParams {
    category: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

#[derive(serde::Serialize)]
struct ErrorOut {
    error: String,
}

async fn items(State(state): State<AppState>, Query(p): Query<ItemsParams>) -> Response {
    let category = match p.category.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(slug) => match Category::from_slug(slug) {
            Some(c) => Some(c),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorOut {
                        error: format!("unknown category `{slug}`"),
                    }),
                )
                    .into_response()
            }
        },
    };

    let all = state.cache.get_or_refresh().await;
    let q = PageQuery {
        category,
        page: p.page.unwrap_or(1),
        per_page: p.per_page.unwrap_or(DEFAULT_PER_PAGE),
    };
    tracing::debug!(target: "api", ?q, total = all.len(), "items page");
    Json(page(&all, &q)).into_response()
}

async fn sources(State(state): State<AppState>) -> Json<Vec<SourceDescriptor>> {
    Json(state.cache.sources().to_vec())
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(h) => h.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
