use super::Storage;
use crate::domain::{Event, Reference, ReferenceKind};
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
    PRAGMA foreign_keys=ON;
    CREATE TABLE IF NOT EXISTS places (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        created_at  INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS artists (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        created_at  INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS tags (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        created_at  INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS events (
        id           TEXT PRIMARY KEY,
        event_name   TEXT NOT NULL,
        start_date   INTEGER NOT NULL,
        end_date     INTEGER NOT NULL,
        thumbnail    TEXT NOT NULL,
        url          TEXT NOT NULL UNIQUE,
        location     TEXT NOT NULL,
        category     TEXT NOT NULL,
        description  TEXT NOT NULL,
        source       TEXT NOT NULL,
        place_id     TEXT REFERENCES places(id),
        created_at   INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_place_id ON events(place_id);
    CREATE TABLE IF NOT EXISTS event_artists (
        event_id   TEXT NOT NULL REFERENCES events(id),
        artist_id  TEXT NOT NULL REFERENCES artists(id),
        PRIMARY KEY (event_id, artist_id)
    );
    CREATE TABLE IF NOT EXISTS event_tags (
        event_id  TEXT NOT NULL REFERENCES events(id),
        tag_id    TEXT NOT NULL REFERENCES tags(id),
        PRIMARY KEY (event_id, tag_id)
    );
"#;

const EVENT_COLUMNS: &str = "id, event_name, start_date, end_date, thumbnail, url, location, \
                             category, description, source, place_id, created_at";

fn reference_table(kind: ReferenceKind) -> &'static str {
    match kind {
        ReferenceKind::Place => "places",
        ReferenceKind::Artist => "artists",
        ReferenceKind::Tag => "tags",
    }
}

/// Link table and its reference column for many-to-many kinds
fn link_table(kind: ReferenceKind) -> Result<(&'static str, &'static str)> {
    match kind {
        ReferenceKind::Artist => Ok(("event_artists", "artist_id")),
        ReferenceKind::Tag => Ok(("event_tags", "tag_id")),
        ReferenceKind::Place => Err(ScraperError::storage(
            "place is referenced from events.place_id, not a link table",
        )),
    }
}

/// Row as stored, before ids and timestamps are decoded
struct EventRow {
    id: String,
    name: String,
    start_date: i64,
    end_date: i64,
    thumbnail: String,
    url: String,
    location: String,
    category: String,
    description: String,
    source: String,
    place_id: Option<String>,
    created_at: i64,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            start_date: row.get(2)?,
            end_date: row.get(3)?,
            thumbnail: row.get(4)?,
            url: row.get(5)?,
            location: row.get(6)?,
            category: row.get(7)?,
            description: row.get(8)?,
            source: row.get(9)?,
            place_id: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_event(self) -> Result<Event> {
        Ok(Event {
            id: Some(parse_uuid(&self.id)?),
            name: self.name,
            start_at: timestamp(self.start_date)?,
            end_at: timestamp(self.end_date)?,
            thumbnail_url: self.thumbnail,
            url: self.url,
            location: self.location,
            category: self.category,
            description: self.description,
            source: self.source,
            place_id: self.place_id.as_deref().map(parse_uuid).transpose()?,
            created_at: timestamp(self.created_at)?,
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| ScraperError::storage(format!("invalid id '{value}' in database: {e}")))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| ScraperError::storage(format!("timestamp {secs} out of range")))
}

/// SQLite-backed storage.
///
/// A transaction is open for the whole lifetime of the handle: `flush`
/// commits it and immediately begins the next one, and dropping the handle
/// rolls back whatever was not flushed.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("conn", &"<Mutex<Connection>>")
            .finish()
    }
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening SQLite database at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch("BEGIN")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ScraperError::storage(format!("sqlite connection lock poisoned: {e}")))
    }

    fn query_events(&self, sql: &str, param: &str) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![param], EventRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(EventRow::into_event).collect()
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_event(&self, event: &mut Event) -> Result<()> {
        let id = Uuid::new_v4();
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                id.to_string(),
                event.name,
                event.start_at.timestamp(),
                event.end_at.timestamp(),
                event.thumbnail_url,
                event.url,
                event.location,
                event.category,
                event.description,
                event.source,
                event.place_id.map(|p| p.to_string()),
                event.created_at.timestamp(),
            ],
        )?;
        event.id = Some(id);
        debug!("Created event: {} with id {}", event.name, id);
        Ok(())
    }

    async fn get_event_by_url(&self, url: &str) -> Result<Option<Event>> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE url = ?1"),
                params![url],
                EventRow::from_row,
            )
            .optional()?
        };
        row.map(EventRow::into_event).transpose()
    }

    async fn get_all_event_urls(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT url FROM events")?;
        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(urls)
    }

    async fn count_events(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn create_reference(&self, reference: &mut Reference) -> Result<()> {
        let id = Uuid::new_v4();
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, name, created_at) VALUES (?1, ?2, ?3)",
                reference_table(reference.kind)
            ),
            params![id.to_string(), reference.name, reference.created_at.timestamp()],
        )?;
        reference.id = Some(id);
        debug!("Created {}: {} with id {}", reference.kind, reference.name, id);
        Ok(())
    }

    async fn get_reference_by_name(
        &self,
        kind: ReferenceKind,
        name: &str,
    ) -> Result<Option<Reference>> {
        let row: Option<(String, String, i64)> = {
            let conn = self.conn()?;
            conn.query_row(
                &format!(
                    "SELECT id, name, created_at FROM {} WHERE name = ?1",
                    reference_table(kind)
                ),
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
        };
        row.map(|(id, name, created_at)| {
            Ok(Reference {
                id: Some(parse_uuid(&id)?),
                kind,
                name,
                created_at: timestamp(created_at)?,
            })
        })
        .transpose()
    }

    async fn get_all_references(&self, kind: ReferenceKind) -> Result<Vec<Reference>> {
        let rows: Vec<(String, String, i64)> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT id, name, created_at FROM {}",
                reference_table(kind)
            ))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter()
            .map(|(id, name, created_at)| {
                Ok(Reference {
                    id: Some(parse_uuid(&id)?),
                    kind,
                    name,
                    created_at: timestamp(created_at)?,
                })
            })
            .collect()
    }

    async fn count_references(&self, kind: ReferenceKind) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", reference_table(kind)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn link_event_reference(
        &self,
        event_id: Uuid,
        kind: ReferenceKind,
        reference_id: Uuid,
    ) -> Result<()> {
        let (table, column) = link_table(kind)?;
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO {table} (event_id, {column}) VALUES (?1, ?2)"),
            params![event_id.to_string(), reference_id.to_string()],
        )?;
        Ok(())
    }

    async fn has_event_reference_link(
        &self,
        event_id: Uuid,
        kind: ReferenceKind,
        reference_id: Uuid,
    ) -> Result<bool> {
        let (table, column) = link_table(kind)?;
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE event_id = ?1 AND {column} = ?2"),
            params![event_id.to_string(), reference_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn get_event_reference_ids(
        &self,
        event_id: Uuid,
        kind: ReferenceKind,
    ) -> Result<Vec<Uuid>> {
        let (table, column) = link_table(kind)?;
        let ids: Vec<String> = {
            let conn = self.conn()?;
            let mut stmt =
                conn.prepare(&format!("SELECT {column} FROM {table} WHERE event_id = ?1"))?;
            let ids = stmt
                .query_map(params![event_id.to_string()], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            ids
        };
        ids.iter().map(|id| parse_uuid(id)).collect()
    }

    async fn get_events_by_reference(
        &self,
        kind: ReferenceKind,
        reference_id: Uuid,
    ) -> Result<Vec<Event>> {
        let sql = match kind {
            ReferenceKind::Place => {
                format!("SELECT {EVENT_COLUMNS} FROM events WHERE place_id = ?1")
            }
            _ => {
                let (table, column) = link_table(kind)?;
                format!(
                    "SELECT {EVENT_COLUMNS} FROM events WHERE id IN \
                     (SELECT event_id FROM {table} WHERE {column} = ?1)"
                )
            }
        };
        self.query_events(&sql, &reference_id.to_string())
    }

    async fn flush(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("COMMIT; BEGIN;")?;
        debug!("Committed SQLite transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(url: &str, place_id: Option<Uuid>) -> Event {
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        Event {
            id: None,
            name: "Show".to_string(),
            start_at: now,
            end_at: now,
            thumbnail_url: "thumb".to_string(),
            url: url.to_string(),
            location: "City".to_string(),
            category: "Music".to_string(),
            description: "desc".to_string(),
            source: "test".to_string(),
            place_id,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_event_round_trips_through_sqlite() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut place = Reference::new(ReferenceKind::Place, "Hall");
        storage.create_reference(&mut place).await.unwrap();

        let mut e = event("e/1", place.id);
        storage.create_event(&mut e).await.unwrap();

        let loaded = storage.get_event_by_url("e/1").await.unwrap().unwrap();
        assert_eq!(loaded, e);

        let by_place = storage
            .get_events_by_reference(ReferenceKind::Place, place.id.unwrap())
            .await
            .unwrap();
        assert_eq!(by_place.len(), 1);
    }

    #[tokio::test]
    async fn test_unique_url_and_duplicate_links_rejected() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut e = event("e/1", None);
        storage.create_event(&mut e).await.unwrap();
        assert!(storage.create_event(&mut event("e/1", None)).await.is_err());

        let mut tag = Reference::new(ReferenceKind::Tag, "Rock");
        storage.create_reference(&mut tag).await.unwrap();
        let (event_id, tag_id) = (e.id.unwrap(), tag.id.unwrap());

        storage
            .link_event_reference(event_id, ReferenceKind::Tag, tag_id)
            .await
            .unwrap();
        assert!(storage
            .has_event_reference_link(event_id, ReferenceKind::Tag, tag_id)
            .await
            .unwrap());
        assert!(storage
            .link_event_reference(event_id, ReferenceKind::Tag, tag_id)
            .await
            .is_err());
        assert_eq!(
            storage
                .get_event_reference_ids(event_id, ReferenceKind::Tag)
                .await
                .unwrap(),
            vec![tag_id]
        );
    }
}
