use crate::constants::NULL_LITERAL;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Raw event data as returned from external APIs or captured pages
pub type RawEventData = serde_json::Value;

/// True when a source value should be treated as "not provided":
/// empty, whitespace only, or the literal `null` some sources emit.
pub fn is_missing_text(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NULL_LITERAL)
}

/// Insertion-ordered set of names. Entries are trimmed, blank or `null`
/// entries are dropped and repeats keep their first position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct NameSet(Vec<String>);

impl NameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits comma-joined text (the legacy scalar form) into a set.
    pub fn from_comma_separated(text: &str) -> Self {
        text.split(',').collect()
    }

    /// Returns true if the name was added.
    pub fn insert(&mut self, name: &str) -> bool {
        let name = name.trim();
        if is_missing_text(name) || self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim();
        self.0.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn to_comma_separated(&self) -> String {
        self.0.join(", ")
    }
}

impl<S: AsRef<str>> FromIterator<S> for NameSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = NameSet::new();
        for name in iter {
            set.insert(name.as_ref());
        }
        set
    }
}

impl From<Vec<String>> for NameSet {
    fn from(names: Vec<String>) -> Self {
        names.into_iter().collect()
    }
}

impl From<NameSet> for Vec<String> {
    fn from(set: NameSet) -> Self {
        set.0
    }
}

impl<'a> IntoIterator for &'a NameSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The normalized, source-agnostic shape every adapter produces and the only
/// shape the ingestion engine understands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalRecord {
    pub name: String,
    /// Epoch seconds as text; left unparsed until the record becomes an event
    pub start_at: Option<String>,
    pub end_at: Option<String>,
    pub thumbnail_url: String,
    pub url: Option<String>,
    pub location_text: String,
    pub category_text: String,
    pub description: String,
    pub source_name: String,
    pub place_name: Option<String>,
    pub artist_names: NameSet,
    pub tag_names: NameSet,
}

impl CanonicalRecord {
    /// The URL if it can serve as a natural key, trimmed.
    pub fn usable_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !is_missing_text(url))
    }

    pub fn usable_place_name(&self) -> Option<&str> {
        self.place_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !is_missing_text(name))
    }
}

/// Capability every event source implements. Sources are registered into a
/// fixed list and run concurrently by the orchestrator.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique identifier for this source, used in logs and CLI selection
    fn source_name(&self) -> &'static str;

    /// Fetch every raw record from the source and normalize it
    async fn fetch_and_normalize(&self) -> Result<Vec<CanonicalRecord>>;
}
