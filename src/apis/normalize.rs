//! Field extraction helpers shared by every source.
//!
//! All of them treat absent keys, JSON `null`, blank strings and the literal
//! text `null` the same way: as "not provided".

use crate::error::Result;
use crate::types::{is_missing_text, CanonicalRecord, NameSet, RawEventData};
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use tracing::{error, info, warn};

/// Scalar JSON value as trimmed text, or `None` when missing.
pub fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!is_missing_text(&text)).then_some(text)
}

pub fn text_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(scalar_text)
}

/// Text at a nested path such as `["nextEventPlace", "city"]`.
pub fn nested_text(raw: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(raw, |node, key| node.get(key))
        .and_then(scalar_text)
}

pub fn text_or(raw: &Value, key: &str, placeholder: &str) -> String {
    text_field(raw, key).unwrap_or_else(|| placeholder.to_string())
}

/// Names from an array field. A plain string is read as comma-joined names.
pub fn name_set(raw: &Value, key: &str) -> NameSet {
    match raw.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(Value::String(joined)) => NameSet::from_comma_separated(joined),
        _ => NameSet::new(),
    }
}

/// Joins the present taxonomy parts, in the given priority order, with ", ".
pub fn join_taxonomy<I>(parts: I) -> String
where
    I: IntoIterator<Item = Option<String>>,
{
    parts
        .into_iter()
        .flatten()
        .filter(|part| !is_missing_text(part))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Converts an ISO-8601 datetime to epoch seconds text. Values without an
/// offset are local datetimes and are read as UTC.
pub fn iso_to_epoch(text: &str) -> Option<String> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp().to_string());
    }
    match text.parse::<NaiveDateTime>() {
        Ok(naive) => Some(naive.and_utc().timestamp().to_string()),
        Err(e) => {
            warn!("Invalid date format '{}': {}", text, e);
            None
        }
    }
}

pub fn iso_field_to_epoch(raw: &Value, key: &str) -> Option<String> {
    text_field(raw, key).and_then(|text| iso_to_epoch(&text))
}

/// Epoch seconds carried as a JSON number or numeric string.
pub fn epoch_field(raw: &Value, key: &str) -> Option<String> {
    let text = text_field(raw, key)?;
    if text.parse::<i64>().is_ok() {
        return Some(text);
    }
    match text.parse::<f64>() {
        Ok(secs) if secs.is_finite() => Some((secs.trunc() as i64).to_string()),
        _ => {
            warn!("Invalid timestamp for {}: {}", key, text);
            None
        }
    }
}

/// Maps every raw record, logging and dropping the ones that fail.
pub fn normalize_all<F>(source: &str, raw: &[RawEventData], mut map: F) -> Vec<CanonicalRecord>
where
    F: FnMut(&RawEventData) -> Result<CanonicalRecord>,
{
    info!("[{}] Starting to map events. Total events to map: {}", source, raw.len());

    let mut mapped = Vec::with_capacity(raw.len());
    for (index, event) in raw.iter().enumerate() {
        match map(event) {
            Ok(record) => mapped.push(record),
            Err(e) => error!("[{}] Error mapping event {}: {} ({})", source, index, e, event),
        }
    }

    info!("[{}] Finished mapping events. Total mapped events: {}", source, mapped.len());
    mapped
}
