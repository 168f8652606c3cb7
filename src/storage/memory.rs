use super::Storage;
use crate::domain::{Event, Reference, ReferenceKind};
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

type LinkKey = (Uuid, ReferenceKind, Uuid);

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    event_ids_by_url: HashMap<String, Uuid>,
    references: HashMap<ReferenceKind, HashMap<String, Reference>>,
    links: HashSet<LinkKey>,
}

impl Tables {
    fn absorb(&mut self, other: Tables) {
        self.events.extend(other.events);
        self.event_ids_by_url.extend(other.event_ids_by_url);
        for (kind, by_name) in other.references {
            self.references.entry(kind).or_default().extend(by_name);
        }
        self.links.extend(other.links);
    }
}

#[derive(Debug, Default)]
struct State {
    committed: Tables,
    pending: Tables,
}

impl State {
    fn layers(&self) -> [&Tables; 2] {
        [&self.committed, &self.pending]
    }

    fn event_by_url(&self, url: &str) -> Option<&Event> {
        self.layers().into_iter().find_map(|t| {
            t.event_ids_by_url
                .get(url)
                .and_then(|id| t.events.get(id))
        })
    }

    fn reference_by_name(&self, kind: ReferenceKind, name: &str) -> Option<&Reference> {
        self.layers()
            .into_iter()
            .find_map(|t| t.references.get(&kind).and_then(|m| m.get(name)))
    }

    fn has_reference_id(&self, kind: ReferenceKind, id: Uuid) -> bool {
        self.layers().into_iter().any(|t| {
            t.references
                .get(&kind)
                .map_or(false, |m| m.values().any(|r| r.id == Some(id)))
        })
    }

    fn has_event_id(&self, id: Uuid) -> bool {
        self.layers().into_iter().any(|t| t.events.contains_key(&id))
    }

    fn has_link(&self, key: &LinkKey) -> bool {
        self.layers().into_iter().any(|t| t.links.contains(key))
    }
}

/// Counters for observing how the engine uses storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub reference_lookups: usize,
    pub reference_inserts: usize,
    pub event_inserts: usize,
    pub flushes: usize,
}

/// In-memory storage for development and testing.
///
/// Writes land in a pending layer that reads can see; `flush` promotes them to
/// the committed layer and `discard_pending` drops them, mimicking a rollback.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
    latency: Option<Duration>,
    reference_lookups: AtomicUsize,
    reference_inserts: AtomicUsize,
    event_inserts: AtomicUsize,
    flushes: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artificial delay to name lookups and inserts, simulating a
    /// remote store so concurrent callers actually interleave.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            reference_lookups: self.reference_lookups.load(Ordering::SeqCst),
            reference_inserts: self.reference_inserts.load(Ordering::SeqCst),
            event_inserts: self.event_inserts.load(Ordering::SeqCst),
            flushes: self.flushes.load(Ordering::SeqCst),
        }
    }

    /// Drops every write made since the last flush.
    pub fn discard_pending(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.pending = Tables::default();
        Ok(())
    }

    /// Number of events that survived a flush.
    pub fn committed_event_count(&self) -> Result<usize> {
        Ok(self.lock()?.committed.events.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| ScraperError::storage(format!("in-memory storage lock poisoned: {e}")))
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_event(&self, event: &mut Event) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        if state.event_by_url(&event.url).is_some() {
            return Err(ScraperError::storage(format!(
                "unique constraint violated: events.url = {}",
                event.url
            )));
        }
        if let Some(place_id) = event.place_id {
            if !state.has_reference_id(ReferenceKind::Place, place_id) {
                return Err(ScraperError::storage(format!(
                    "foreign key violated: place {place_id} does not exist"
                )));
            }
        }

        let id = Uuid::new_v4();
        event.id = Some(id);
        state.pending.event_ids_by_url.insert(event.url.clone(), id);
        state.pending.events.insert(id, event.clone());
        self.event_inserts.fetch_add(1, Ordering::SeqCst);

        debug!("Created event: {} with id {}", event.name, id);
        Ok(())
    }

    async fn get_event_by_url(&self, url: &str) -> Result<Option<Event>> {
        let state = self.lock()?;
        Ok(state.event_by_url(url).cloned())
    }

    async fn get_all_event_urls(&self) -> Result<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .layers()
            .into_iter()
            .flat_map(|t| t.event_ids_by_url.keys().cloned())
            .collect())
    }

    async fn count_events(&self) -> Result<usize> {
        let state = self.lock()?;
        Ok(state.committed.events.len() + state.pending.events.len())
    }

    async fn create_reference(&self, reference: &mut Reference) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        if state.reference_by_name(reference.kind, &reference.name).is_some() {
            return Err(ScraperError::storage(format!(
                "unique constraint violated: {}.name = {}",
                reference.kind, reference.name
            )));
        }

        let id = Uuid::new_v4();
        reference.id = Some(id);
        state
            .pending
            .references
            .entry(reference.kind)
            .or_default()
            .insert(reference.name.clone(), reference.clone());
        self.reference_inserts.fetch_add(1, Ordering::SeqCst);

        debug!("Created {}: {} with id {}", reference.kind, reference.name, id);
        Ok(())
    }

    async fn get_reference_by_name(
        &self,
        kind: ReferenceKind,
        name: &str,
    ) -> Result<Option<Reference>> {
        self.reference_lookups.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let state = self.lock()?;
        Ok(state.reference_by_name(kind, name).cloned())
    }

    async fn get_all_references(&self, kind: ReferenceKind) -> Result<Vec<Reference>> {
        let state = self.lock()?;
        Ok(state
            .layers()
            .into_iter()
            .filter_map(|t| t.references.get(&kind))
            .flat_map(|m| m.values().cloned())
            .collect())
    }

    async fn count_references(&self, kind: ReferenceKind) -> Result<usize> {
        let state = self.lock()?;
        Ok(state
            .layers()
            .into_iter()
            .filter_map(|t| t.references.get(&kind))
            .map(|m| m.len())
            .sum())
    }

    async fn link_event_reference(
        &self,
        event_id: Uuid,
        kind: ReferenceKind,
        reference_id: Uuid,
    ) -> Result<()> {
        if !kind.is_linked() {
            return Err(ScraperError::storage(format!(
                "{kind} is not linked through a link table"
            )));
        }
        let mut state = self.lock()?;
        if !state.has_event_id(event_id) || !state.has_reference_id(kind, reference_id) {
            return Err(ScraperError::storage(format!(
                "foreign key violated: event {event_id} -> {kind} {reference_id}"
            )));
        }
        let key = (event_id, kind, reference_id);
        if state.has_link(&key) {
            return Err(ScraperError::storage(format!(
                "unique constraint violated: event {event_id} already linked to {kind} {reference_id}"
            )));
        }
        state.pending.links.insert(key);
        Ok(())
    }

    async fn has_event_reference_link(
        &self,
        event_id: Uuid,
        kind: ReferenceKind,
        reference_id: Uuid,
    ) -> Result<bool> {
        let state = self.lock()?;
        Ok(state.has_link(&(event_id, kind, reference_id)))
    }

    async fn get_event_reference_ids(
        &self,
        event_id: Uuid,
        kind: ReferenceKind,
    ) -> Result<Vec<Uuid>> {
        let state = self.lock()?;
        Ok(state
            .layers()
            .into_iter()
            .flat_map(|t| t.links.iter())
            .filter(|(e, k, _)| *e == event_id && *k == kind)
            .map(|(_, _, r)| *r)
            .collect())
    }

    async fn get_events_by_reference(
        &self,
        kind: ReferenceKind,
        reference_id: Uuid,
    ) -> Result<Vec<Event>> {
        let state = self.lock()?;
        let events = state.layers().into_iter().flat_map(|t| t.events.values());
        let matching: Vec<Event> = match kind {
            ReferenceKind::Place => events
                .filter(|e| e.place_id == Some(reference_id))
                .cloned()
                .collect(),
            _ => events
                .filter(|e| {
                    e.id.map_or(false, |id| state.has_link(&(id, kind, reference_id)))
                })
                .cloned()
                .collect(),
        };
        Ok(matching)
    }

    async fn flush(&self) -> Result<()> {
        let mut state = self.lock()?;
        let pending = std::mem::take(&mut state.pending);
        debug!(
            "Flushing {} events, {} links",
            pending.events.len(),
            pending.links.len()
        );
        state.committed.absorb(pending);
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
