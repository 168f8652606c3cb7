use crate::config::PipelineConfig;
use crate::error::{Result, ScraperError};
use crate::types::{CanonicalRecord, SourceAdapter};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// What one source contributed to a run
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub records: usize,
    pub error: Option<String>,
    pub duration_secs: f64,
}

impl SourceOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Merged records plus per-source outcomes, in registration order
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub records: Vec<CanonicalRecord>,
    pub sources: Vec<SourceOutcome>,
}

impl ScrapeReport {
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| !s.succeeded()).count()
    }
}

/// Runs every source concurrently on a bounded worker pool and joins the
/// results behind a single barrier.
pub struct Orchestrator {
    workers: Arc<Semaphore>,
    adapter_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(workers: usize, adapter_timeout: Option<Duration>) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(workers.max(1))),
            adapter_timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.workers,
            config.adapter_timeout_secs.map(Duration::from_secs),
        )
    }

    /// Merged records of every source that succeeded.
    pub async fn run(&self, adapters: Vec<Arc<dyn SourceAdapter>>) -> Vec<CanonicalRecord> {
        self.run_with_report(adapters).await.records
    }

    /// Failed, panicked or timed-out sources contribute no records and never
    /// affect their siblings. Records are concatenated in registration order.
    pub async fn run_with_report(&self, adapters: Vec<Arc<dyn SourceAdapter>>) -> ScrapeReport {
        if adapters.is_empty() {
            warn!("No sources registered, nothing to scrape");
            return ScrapeReport::default();
        }

        info!("Starting {} sources", adapters.len());
        let handles: Vec<_> = adapters
            .into_iter()
            .map(|adapter| {
                let source = adapter.source_name();
                let workers = self.workers.clone();
                let timeout = self.adapter_timeout;
                let handle = tokio::spawn(async move {
                    let started = Instant::now();
                    let result = match workers.acquire_owned().await {
                        Ok(_permit) => run_adapter(adapter, timeout).await,
                        Err(e) => Err(ScraperError::api(format!("worker pool closed: {e}"))),
                    };
                    (result, started.elapsed())
                });
                (source, handle)
            })
            .collect();

        let mut report = ScrapeReport::default();
        for (source, handle) in handles {
            let (result, elapsed) = match handle.await {
                Ok(joined) => joined,
                Err(join_error) => (
                    Err(ScraperError::AdapterPanicked {
                        source_name: source.to_string(),
                        message: join_error.to_string(),
                    }),
                    Duration::ZERO,
                ),
            };
            let duration_secs = elapsed.as_secs_f64();
            histogram!("planzy_fetch_duration_seconds", "source" => source).record(duration_secs);

            let outcome = match result {
                Ok(records) => {
                    info!(source, records = records.len(), "Source finished");
                    counter!("planzy_adapter_records_total", "source" => source)
                        .increment(records.len() as u64);
                    let outcome = SourceOutcome {
                        source: source.to_string(),
                        records: records.len(),
                        error: None,
                        duration_secs,
                    };
                    report.records.extend(records);
                    outcome
                }
                Err(e) => {
                    error!(source, error = %e, "Source failed, contributing no records");
                    counter!("planzy_adapter_failures_total", "source" => source).increment(1);
                    SourceOutcome {
                        source: source.to_string(),
                        records: 0,
                        error: Some(e.to_string()),
                        duration_secs,
                    }
                }
            };
            report.sources.push(outcome);
        }

        info!(
            "All sources finished: {} records merged, {} of {} sources failed",
            report.records.len(),
            report.failed_sources(),
            report.sources.len()
        );
        report
    }
}

async fn run_adapter(
    adapter: Arc<dyn SourceAdapter>,
    timeout: Option<Duration>,
) -> Result<Vec<CanonicalRecord>> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, adapter.fetch_and_normalize())
            .await
            .map_err(|_| ScraperError::Timeout {
                source_name: adapter.source_name().to_string(),
                secs: limit.as_secs(),
            })?,
        None => adapter.fetch_and_normalize().await,
    }
}
