use crate::cache::ReferenceCaches;
use crate::config::PipelineConfig;
use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_THRESHOLD, DEFAULT_PROGRESS_EVERY};
use crate::domain::{Event, ReferenceKind};
use crate::error::{Result, ScraperError};
use crate::storage::Storage;
use crate::types::{CanonicalRecord, NameSet};
use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Batching knobs for one engine
#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    pub batch_size: usize,
    pub flush_threshold: usize,
    pub progress_every: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl From<&PipelineConfig> for IngestSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            flush_threshold: config.flush_threshold.max(1),
            progress_every: config.progress_every.max(1),
        }
    }
}

/// Counts for one `ingest` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub skipped_missing_url: usize,
    pub skipped_duplicate: usize,
    pub errors: usize,
    pub flushes: usize,
}

impl IngestReport {
    pub fn skipped(&self) -> usize {
        self.skipped_missing_url + self.skipped_duplicate
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} created, {} skipped ({} without URL, {} duplicates), {} errors, {} flushes",
            self.processed,
            self.succeeded,
            self.skipped(),
            self.skipped_missing_url,
            self.skipped_duplicate,
            self.errors,
            self.flushes
        )
    }
}

enum RecordOutcome {
    Created,
    SkippedMissingUrl,
    SkippedDuplicate,
}

/// Turns canonical records into stored events, deduplicating by URL and
/// sharing place/artist/tag rows by name.
///
/// One engine serves one run: its caches and seen-URL set start from what
/// `preload` reads and are dropped with the engine.
pub struct IngestionEngine {
    storage: Arc<dyn Storage>,
    settings: IngestSettings,
    caches: ReferenceCaches,
    seen_urls: HashSet<String>,
    /// Events written since the last flush
    working_set: Vec<Uuid>,
}

impl IngestionEngine {
    pub fn new(storage: Arc<dyn Storage>, settings: IngestSettings) -> Self {
        Self {
            caches: ReferenceCaches::new(storage.clone()),
            storage,
            settings,
            seen_urls: HashSet::new(),
            working_set: Vec::new(),
        }
    }

    pub fn caches(&self) -> &ReferenceCaches {
        &self.caches
    }

    pub fn seen_url_count(&self) -> usize {
        self.seen_urls.len()
    }

    /// Seeds the caches and the seen-URL set from storage.
    #[instrument(skip(self))]
    pub async fn preload(&mut self) -> Result<()> {
        self.caches.preload().await?;
        self.seen_urls = self.storage.get_all_event_urls().await?.into_iter().collect();
        info!("Loaded {} existing event URLs", self.seen_urls.len());
        Ok(())
    }

    /// Ingests `records` in batches. Record-level failures are counted and
    /// skipped; a failed flush aborts the run with
    /// [`ScraperError::IngestAborted`], which carries the counts reached so far.
    #[instrument(skip(self, records), fields(total = records.len()))]
    pub async fn ingest(&mut self, records: &[CanonicalRecord]) -> Result<IngestReport> {
        let mut report = IngestReport {
            total: records.len(),
            ..Default::default()
        };
        info!("Ingesting {} records", records.len());

        if let Err(e) = self.ingest_batches(records, &mut report).await {
            error!("Ingestion aborted: {} ({})", report, e);
            return Err(ScraperError::IngestAborted {
                report,
                source: Box::new(e),
            });
        }

        info!("Ingestion finished: {}", report);
        Ok(report)
    }

    async fn ingest_batches(
        &mut self,
        records: &[CanonicalRecord],
        report: &mut IngestReport,
    ) -> Result<()> {
        for batch in records.chunks(self.settings.batch_size) {
            for record in batch {
                let mut flush_due = false;
                match self.process_record(record).await {
                    Ok(RecordOutcome::Created) => {
                        report.succeeded += 1;
                        counter!("planzy_ingest_records_total", "outcome" => "created").increment(1);
                        flush_due = report.succeeded % self.settings.flush_threshold == 0;
                    }
                    Ok(RecordOutcome::SkippedMissingUrl) => {
                        report.skipped_missing_url += 1;
                        debug!(name = %record.name, source = %record.source_name, "Skipping record without URL");
                        counter!("planzy_ingest_records_total", "outcome" => "skipped_missing_url")
                            .increment(1);
                    }
                    Ok(RecordOutcome::SkippedDuplicate) => {
                        report.skipped_duplicate += 1;
                        debug!(url = ?record.usable_url(), "Skipping already stored event");
                        counter!("planzy_ingest_records_total", "outcome" => "skipped_duplicate")
                            .increment(1);
                    }
                    Err(e) => {
                        report.errors += 1;
                        error!(
                            url = ?record.url,
                            name = %record.name,
                            source = %record.source_name,
                            "Error processing record: {}", e
                        );
                        counter!("planzy_ingest_records_total", "outcome" => "error").increment(1);
                    }
                }

                report.processed += 1;
                if report.processed % self.settings.progress_every == 0 {
                    info!(
                        "Progress: {}/{} processed, {} created, {} skipped, {} errors",
                        report.processed,
                        report.total,
                        report.succeeded,
                        report.skipped(),
                        report.errors
                    );
                }
                if flush_due {
                    self.flush(report).await?;
                }
            }

            self.flush(report).await?;
        }
        Ok(())
    }

    async fn process_record(&mut self, record: &CanonicalRecord) -> Result<RecordOutcome> {
        let Some(url) = record.usable_url() else {
            return Ok(RecordOutcome::SkippedMissingUrl);
        };
        if self.seen_urls.contains(url) {
            return Ok(RecordOutcome::SkippedDuplicate);
        }

        let mut event = Event::from_record(record, url, Utc::now());

        if let Some(place_name) = record.usable_place_name() {
            let place = self.caches.places.resolve_or_create(place_name).await?;
            event.place_id = place.id;
        }
        let artist_ids = self.resolve_all(ReferenceKind::Artist, &record.artist_names).await?;
        let tag_ids = self.resolve_all(ReferenceKind::Tag, &record.tag_names).await?;

        self.storage.create_event(&mut event).await?;
        self.seen_urls.insert(url.to_string());

        if let Some(event_id) = event.id {
            self.working_set.push(event_id);
            self.link_all(event_id, ReferenceKind::Artist, &artist_ids).await?;
            self.link_all(event_id, ReferenceKind::Tag, &tag_ids).await?;
        }

        debug!(url, name = %event.name, "Created event");
        Ok(RecordOutcome::Created)
    }

    async fn resolve_all(&self, kind: ReferenceKind, names: &NameSet) -> Result<Vec<Uuid>> {
        let cache = self.caches.for_kind(kind);
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            if let Some(id) = cache.resolve_or_create(name).await?.id {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn link_all(&self, event_id: Uuid, kind: ReferenceKind, ids: &[Uuid]) -> Result<()> {
        for &reference_id in ids {
            if self
                .storage
                .has_event_reference_link(event_id, kind, reference_id)
                .await?
            {
                continue;
            }
            self.storage
                .link_event_reference(event_id, kind, reference_id)
                .await?;
        }
        Ok(())
    }

    async fn flush(&mut self, report: &mut IngestReport) -> Result<()> {
        self.storage.flush().await?;
        debug!("Flushed {} events", self.working_set.len());
        self.working_set.clear();
        report.flushes += 1;
        Ok(())
    }
}
