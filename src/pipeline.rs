use crate::config::Config;
use crate::error::Result;
use crate::ingest::{IngestReport, IngestSettings, IngestionEngine};
use crate::orchestrator::{Orchestrator, ScrapeReport, SourceOutcome};
use crate::storage::Storage;
use crate::types::{CanonicalRecord, SourceAdapter};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Result of a complete scrape-then-ingest run
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub sources: Vec<SourceOutcome>,
    pub merged_records: usize,
    pub ingest: IngestReport,
    pub duration_secs: f64,
}

/// One invocation: a fresh orchestrator and ingestion engine over a shared storage.
pub struct Pipeline {
    orchestrator: Orchestrator,
    storage: Arc<dyn Storage>,
    settings: IngestSettings,
}

impl Pipeline {
    pub fn new(config: &Config, storage: Arc<dyn Storage>) -> Self {
        Self {
            orchestrator: Orchestrator::from_config(&config.pipeline),
            storage,
            settings: IngestSettings::from(&config.pipeline),
        }
    }

    /// Fetch and merge only.
    pub async fn scrape(&self, adapters: Vec<Arc<dyn SourceAdapter>>) -> ScrapeReport {
        self.orchestrator.run_with_report(adapters).await
    }

    /// Ingest already merged records with a freshly preloaded engine.
    pub async fn ingest(&self, records: &[CanonicalRecord]) -> Result<IngestReport> {
        let mut engine = IngestionEngine::new(self.storage.clone(), self.settings);
        engine.preload().await?;
        engine.ingest(records).await
    }

    /// Scrape every source, optionally dump the merged records, then ingest them.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        dump_path: Option<&Path>,
    ) -> Result<PipelineReport> {
        let started = Instant::now();
        info!("🚀 Starting pipeline run");

        let scraped = self.scrape(adapters).await;
        if let Some(path) = dump_path {
            write_records(path, &scraped.records)?;
        }

        let ingest = self.ingest(&scraped.records).await?;

        let report = PipelineReport {
            sources: scraped.sources,
            merged_records: scraped.records.len(),
            ingest,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        info!("✅ Pipeline finished in {:.2}s", report.duration_secs);
        Ok(report)
    }
}

/// Writes merged records as pretty JSON, creating parent directories.
pub fn write_records(path: &Path, records: &[CanonicalRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json_content = serde_json::to_string_pretty(records)?;
    fs::write(path, json_content)?;
    info!("💾 Saved {} records to {}", records.len(), path.display());
    Ok(())
}

pub fn read_records(path: &Path) -> Result<Vec<CanonicalRecord>> {
    let content = fs::read_to_string(path)?;
    let records: Vec<CanonicalRecord> = serde_json::from_str(&content)?;
    info!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}
