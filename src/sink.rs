// src/sink.rs
//! Hand-off of merged items to whatever persists them.
//!
//! Persistence is detached from the request path: `Persister::persist` spawns a
//! task and returns immediately. Failures are logged, counted, and reported on
//! an error channel; each batch gets a bounded number of attempts.

use anyhow::{Context, Result};
use metrics::counter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::ingest::FeedItem;

#[async_trait::async_trait]
pub trait ItemSink: Send + Sync {
    /// Store one merged batch.
    async fn store(&self, items: Vec<FeedItem>) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// A batch that could not be stored after all attempts.
#[derive(Debug)]
pub struct SinkFailure {
    pub sink: &'static str,
    pub items: usize,
    pub error: anyhow::Error,
}

#[derive(Clone)]
pub struct Persister {
    sink: Arc<dyn ItemSink>,
    failures: mpsc::UnboundedSender<SinkFailure>,
    max_attempts: u32,
    backoff: Duration,
}

impl Persister {
    /// Returns the persister and the receiving end of its error channel.
    /// Dropping the receiver is fine; failures are still logged.
    pub fn new(sink: Arc<dyn ItemSink>) -> (Self, mpsc::UnboundedReceiver<SinkFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sink,
                failures: tx,
                max_attempts: 2,
                backoff: Duration::from_millis(500),
            },
            rx,
        )
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Detached store. The handle may be ignored.
    pub fn persist(&self, items: Vec<FeedItem>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let n = items.len();
            let mut attempt = 1;
            loop {
                match this.sink.store(items.clone()).await {
                    Ok(()) => {
                        tracing::debug!(target: "sink", sink = this.sink.name(), items = n, "batch stored");
                        return;
                    }
                    Err(e) if attempt < this.max_attempts => {
                        tracing::warn!(target: "sink", sink = this.sink.name(), attempt, error = %e, "store failed; retrying");
                        attempt += 1;
                        tokio::time::sleep(this.backoff).await;
                    }
                    Err(e) => {
                        tracing::error!(target: "sink", sink = this.sink.name(), items = n, error = %e, "store failed; batch dropped");
                        counter!("aggregator_sink_errors_total").increment(1);
                        let _ = this.failures.send(SinkFailure {
                            sink: this.sink.name(),
                            items: n,
                            error: e,
                        });
                        return;
                    }
                }
            }
        })
    }
}

/// Writes the latest batch as pretty JSON, replacing the file atomically.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ItemSink for JsonFileSink {
    async fn store(&self, items: Vec<FeedItem>) -> Result<()> {
        let json = serde_json::to_vec_pretty(&items).context("serializing items")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json-file"
    }
}

// --- Test helper ---
pub struct MemorySink {
    pub calls: std::sync::Mutex<Vec<Vec<FeedItem>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(vec![]),
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ItemSink for MemorySink {
    async fn store(&self, items: Vec<FeedItem>) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink poisoned"))?
            .push(items);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
