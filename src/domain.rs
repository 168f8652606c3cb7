use crate::constants::{
    DEFAULT_CATEGORY, DEFAULT_DESCRIPTION, DEFAULT_EVENT_NAME, DEFAULT_LOCATION, DEFAULT_SOURCE,
    DEFAULT_THUMBNAIL,
};
use crate::types::{is_missing_text, CanonicalRecord};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// The three kinds of shared, name-keyed rows events point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Place,
    Artist,
    Tag,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 3] = [ReferenceKind::Place, ReferenceKind::Artist, ReferenceKind::Tag];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Place => "place",
            ReferenceKind::Artist => "artist",
            ReferenceKind::Tag => "tag",
        }
    }

    /// Whether events link to this kind through a many-to-many link table
    pub fn is_linked(&self) -> bool {
        !matches!(self, ReferenceKind::Place)
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A place, artist or tag. Identity is the surrogate id, `name` is unique per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: Option<Uuid>,
    pub kind: ReferenceKind,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Reference {
    pub fn new(kind: ReferenceKind, name: &str) -> Self {
        Self {
            id: None,
            kind,
            name: name.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A stored event. `url` is the natural key. Artist and tag links are owned by
/// the event and live in storage link tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<Uuid>,
    pub name: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub thumbnail_url: String,
    pub url: String,
    pub location: String,
    pub category: String,
    pub description: String,
    pub source: String,
    pub place_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Builds the scalar part of an event. Missing or unparseable timestamps
    /// fall back to `now` and `start + 1h`; blank text gets the default placeholder.
    pub fn from_record(record: &CanonicalRecord, url: &str, now: DateTime<Utc>) -> Self {
        let start_at = parse_epoch_seconds(record.start_at.as_deref()).unwrap_or(now);
        let end_at = parse_epoch_seconds(record.end_at.as_deref())
            .unwrap_or_else(|| default_end(start_at));

        Self {
            id: None,
            name: text_or_default(&record.name, DEFAULT_EVENT_NAME),
            start_at,
            end_at,
            thumbnail_url: text_or_default(&record.thumbnail_url, DEFAULT_THUMBNAIL),
            url: url.to_string(),
            location: text_or_default(&record.location_text, DEFAULT_LOCATION),
            category: text_or_default(&record.category_text, DEFAULT_CATEGORY),
            description: text_or_default(&record.description, DEFAULT_DESCRIPTION),
            source: text_or_default(&record.source_name, DEFAULT_SOURCE),
            place_id: None,
            created_at: now,
        }
    }
}

/// One hour after `start_at`, or `start_at` itself at the end of the representable range.
fn default_end(start_at: DateTime<Utc>) -> DateTime<Utc> {
    start_at
        .checked_add_signed(Duration::hours(1))
        .unwrap_or_else(|| {
            warn!("End time after {} is out of range, using the start time", start_at);
            start_at
        })
}

fn text_or_default(value: &str, default: &str) -> String {
    if is_missing_text(value) {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Parses epoch seconds text. Absent values and the `null` literal are silent;
/// anything else that fails to parse is logged.
pub fn parse_epoch_seconds(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value.map(str::trim).filter(|v| !is_missing_text(v))?;
    match value.parse::<i64>() {
        Ok(secs) => {
            let parsed = DateTime::<Utc>::from_timestamp(secs, 0);
            if parsed.is_none() {
                warn!("Timestamp out of range: {}", value);
            }
            parsed
        }
        Err(_) => {
            warn!("Invalid timestamp format: {}", value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_unparseable_start_falls_back_to_now() {
        let record = CanonicalRecord {
            name: "Show".to_string(),
            start_at: Some("next friday".to_string()),
            ..Default::default()
        };
        let event = Event::from_record(&record, "e/1", now());
        assert_eq!(event.start_at, now());
        assert_eq!(event.end_at, now() + Duration::hours(1));
    }

    #[test]
    fn test_end_defaults_to_one_hour_after_parsed_start() {
        let record = CanonicalRecord {
            start_at: Some("1735754400".to_string()),
            end_at: Some("null".to_string()),
            ..Default::default()
        };
        let event = Event::from_record(&record, "e/2", now());
        assert_eq!(event.start_at.timestamp(), 1_735_754_400);
        assert_eq!(event.end_at.timestamp(), 1_735_754_400 + 3600);
    }

    #[test]
    fn test_start_at_end_of_range_does_not_overflow_end() {
        let last = DateTime::<Utc>::MAX_UTC.timestamp();
        let record = CanonicalRecord {
            start_at: Some(last.to_string()),
            ..Default::default()
        };
        let event = Event::from_record(&record, "e/max", now());
        assert_eq!(event.start_at.timestamp(), last);
        assert_eq!(event.end_at, event.start_at);
    }

    #[test]
    fn test_blank_fields_get_engine_defaults() {
        let record = CanonicalRecord {
            name: " ".to_string(),
            description: "null".to_string(),
            ..Default::default()
        };
        let event = Event::from_record(&record, "e/3", now());
        assert_eq!(event.name, DEFAULT_EVENT_NAME);
        assert_eq!(event.description, DEFAULT_DESCRIPTION);
        assert_eq!(event.source, DEFAULT_SOURCE);
        assert_eq!(event.thumbnail_url, DEFAULT_THUMBNAIL);
        assert_eq!(event.place_id, None);
    }
}
