// src/config/aggregator.rs
//! Runtime knobs for fetching, aggregation, caching and the HTTP surface.
//! Everything has a default; env vars (optionally from `.env`) override.

use std::net::SocketAddr;
use std::time::Duration;

use crate::ingest::{AggregateOptions, FetchConfig, ParseLimits};
use crate::ingest::fetcher::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_BODY_BYTES, DEFAULT_USER_AGENT};

pub const ENV_FETCH_TIMEOUT_SECS: &str = "AGGREGATOR_FETCH_TIMEOUT_SECS";
pub const ENV_USER_AGENT: &str = "AGGREGATOR_USER_AGENT";
pub const ENV_MAX_ITEMS: &str = "AGGREGATOR_MAX_ITEMS";
pub const ENV_SUMMARY_CHARS: &str = "AGGREGATOR_SUMMARY_CHARS";
pub const ENV_MAX_CONCURRENCY: &str = "AGGREGATOR_MAX_CONCURRENCY";
pub const ENV_DEADLINE_SECS: &str = "AGGREGATOR_DEADLINE_SECS";
pub const ENV_CACHE_TTL_SECS: &str = "AGGREGATOR_CACHE_TTL_SECS";
pub const ENV_BIND: &str = "AGGREGATOR_BIND";
pub const ENV_MAX_BODY_BYTES: &str = "AGGREGATOR_MAX_BODY_BYTES";

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub fetch: FetchConfig,
    pub aggregate: AggregateOptions,
    pub cache_ttl: Duration,
    pub bind: SocketAddr,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            aggregate: AggregateOptions::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

impl AggregatorConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env`, over any key lookup.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();

        let timeout = parse_u64(get(ENV_FETCH_TIMEOUT_SECS), ENV_FETCH_TIMEOUT_SECS)
            .map(|s| Duration::from_secs(s.clamp(1, 120)))
            .unwrap_or(DEFAULT_FETCH_TIMEOUT);
        let user_agent = get(ENV_USER_AGENT)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let limits = ParseLimits {
            max_records: parse_u64(get(ENV_MAX_ITEMS), ENV_MAX_ITEMS)
                .map(|n| n.clamp(1, 100) as usize)
                .unwrap_or(d.fetch.limits.max_records),
            summary_max_chars: parse_u64(get(ENV_SUMMARY_CHARS), ENV_SUMMARY_CHARS)
                .map(|n| n.clamp(0, 5_000) as usize)
                .unwrap_or(d.fetch.limits.summary_max_chars),
        };

        let max_body_bytes = parse_u64(get(ENV_MAX_BODY_BYTES), ENV_MAX_BODY_BYTES)
            .map(|n| n.clamp(1024, 64 * 1024 * 1024) as usize)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        let aggregate = AggregateOptions {
            max_concurrency: parse_u64(get(ENV_MAX_CONCURRENCY), ENV_MAX_CONCURRENCY)
                .filter(|n| *n > 0)
                .map(|n| n as usize),
            deadline: parse_u64(get(ENV_DEADLINE_SECS), ENV_DEADLINE_SECS)
                .filter(|n| *n > 0)
                .map(Duration::from_secs),
        };

        let cache_ttl = parse_u64(get(ENV_CACHE_TTL_SECS), ENV_CACHE_TTL_SECS)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL);

        let bind = match get(ENV_BIND) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "invalid {ENV_BIND}; using {DEFAULT_BIND}");
                default_bind()
            }),
            None => default_bind(),
        };

        Self {
            fetch: FetchConfig {
                timeout,
                user_agent,
                limits,
                max_body_bytes,
            },
            aggregate,
            cache_ttl,
            bind,
        }
    }
}

fn parse_u64(raw: Option<String>, key: &str) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring non-numeric config value");
            None
        }
    }
}
