//! Name-keyed caches for places, artists and tags.
//!
//! Each cache maps a natural key to its stored row. Resolution of an unseen
//! name goes through a per-name `OnceCell`, so concurrent callers asking for the
//! same name share one lookup-or-insert instead of racing to create two rows.

use crate::domain::{Reference, ReferenceKind};
use crate::error::{Result, ScraperError};
use crate::storage::Storage;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

pub struct ReferenceCache {
    kind: ReferenceKind,
    storage: Arc<dyn Storage>,
    entries: DashMap<String, Arc<OnceCell<Reference>>>,
}

impl std::fmt::Debug for ReferenceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceCache")
            .field("kind", &self.kind)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ReferenceCache {
    pub fn new(kind: ReferenceKind, storage: Arc<dyn Storage>) -> Self {
        Self {
            kind,
            storage,
            entries: DashMap::new(),
        }
    }

    /// Replaces the cache contents with every stored row of this kind.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub async fn preload(&self) -> Result<usize> {
        let rows = self.storage.get_all_references(self.kind).await?;
        self.entries.clear();
        for reference in rows {
            self.entries.insert(
                reference.name.clone(),
                Arc::new(OnceCell::new_with(Some(reference))),
            );
        }
        info!("Loaded {} {}s into cache", self.entries.len(), self.kind);
        Ok(self.entries.len())
    }

    /// Returns the row for `name`, creating it on first sight.
    ///
    /// Cached names never touch storage. Otherwise storage is checked by name
    /// and a row is inserted only if none exists. A failed resolution leaves
    /// the name unresolved so a later call can retry.
    pub async fn resolve_or_create(&self, name: &str) -> Result<Reference> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ScraperError::MissingField(format!("{} name", self.kind)));
        }

        // Clone the cell out so the shard lock is released before awaiting
        let cell = self
            .entries
            .entry(name.to_string())
            .or_default()
            .value()
            .clone();

        let reference = cell
            .get_or_try_init(|| self.find_or_insert(name))
            .await?;
        Ok(reference.clone())
    }

    async fn find_or_insert(&self, name: &str) -> Result<Reference> {
        if let Some(existing) = self.storage.get_reference_by_name(self.kind, name).await? {
            debug!("Found existing {}: {}", self.kind, name);
            return Ok(existing);
        }

        let mut reference = Reference::new(self.kind, name);
        match self.storage.create_reference(&mut reference).await {
            Ok(()) => {
                debug!("Created new {}: {}", self.kind, name);
                Ok(reference)
            }
            Err(e) => {
                // Another writer may have inserted the row since our lookup
                warn!("Creating {} '{}' failed, re-checking storage: {}", self.kind, name, e);
                self.storage
                    .get_reference_by_name(self.kind, name)
                    .await?
                    .ok_or(e)
            }
        }
    }

    /// Cached row for `name`, without touching storage.
    pub fn get(&self, name: &str) -> Option<Reference> {
        self.entries
            .get(name.trim())
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of resolved names.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

/// The three caches an ingestion run works with.
#[derive(Debug)]
pub struct ReferenceCaches {
    pub places: ReferenceCache,
    pub artists: ReferenceCache,
    pub tags: ReferenceCache,
}

impl ReferenceCaches {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            places: ReferenceCache::new(ReferenceKind::Place, storage.clone()),
            artists: ReferenceCache::new(ReferenceKind::Artist, storage.clone()),
            tags: ReferenceCache::new(ReferenceKind::Tag, storage),
        }
    }

    /// Preloads every kind; returns the total number of rows loaded.
    pub async fn preload(&self) -> Result<usize> {
        let mut loaded = 0;
        for kind in ReferenceKind::ALL {
            loaded += self.for_kind(kind).preload().await?;
        }
        Ok(loaded)
    }

    pub fn for_kind(&self, kind: ReferenceKind) -> &ReferenceCache {
        match kind {
            ReferenceKind::Place => &self.places,
            ReferenceKind::Artist => &self.artists,
            ReferenceKind::Tag => &self.tags,
        }
    }
}
