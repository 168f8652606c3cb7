use crate::domain::{Event, Reference, ReferenceKind};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

/// Storage boundary for events and their reference entities.
///
/// Writes accumulate in a unit of work and become durable together on
/// [`Storage::flush`]. Reads always observe unflushed writes made through the
/// same storage handle.
#[async_trait]
pub trait Storage: Send + Sync {
    // Event operations
    async fn create_event(&self, event: &mut Event) -> Result<()>;
    async fn get_event_by_url(&self, url: &str) -> Result<Option<Event>>;
    async fn get_all_event_urls(&self) -> Result<Vec<String>>;
    async fn count_events(&self) -> Result<usize>;

    // Place / artist / tag operations
    async fn create_reference(&self, reference: &mut Reference) -> Result<()>;
    async fn get_reference_by_name(
        &self,
        kind: ReferenceKind,
        name: &str,
    ) -> Result<Option<Reference>>;
    async fn get_all_references(&self, kind: ReferenceKind) -> Result<Vec<Reference>>;
    async fn count_references(&self, kind: ReferenceKind) -> Result<usize>;

    // Event -> artist / tag links. `kind` must be a linked kind.
    async fn link_event_reference(
        &self,
        event_id: Uuid,
        kind: ReferenceKind,
        reference_id: Uuid,
    ) -> Result<()>;
    async fn has_event_reference_link(
        &self,
        event_id: Uuid,
        kind: ReferenceKind,
        reference_id: Uuid,
    ) -> Result<bool>;
    async fn get_event_reference_ids(&self, event_id: Uuid, kind: ReferenceKind)
        -> Result<Vec<Uuid>>;

    /// Reverse lookup: events pointing at a place, or linked to an artist or tag
    async fn get_events_by_reference(
        &self,
        kind: ReferenceKind,
        reference_id: Uuid,
    ) -> Result<Vec<Event>>;

    /// Commit everything written since the previous flush
    async fn flush(&self) -> Result<()>;
}
