use crate::ingest::IngestReport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Source '{source_name}' timed out after {secs}s")]
    Timeout { source_name: String, secs: u64 },

    #[error("Source '{source_name}' panicked: {message}")]
    AdapterPanicked { source_name: String, message: String },

    /// A flush failed mid-run; `report` holds the counts reached before it
    #[error("Ingestion aborted after {} records: {source}", .report.processed)]
    IngestAborted {
        report: IngestReport,
        #[source]
        source: Box<ScraperError>,
    },
}

impl ScraperError {
    pub fn storage(message: impl Into<String>) -> Self {
        ScraperError::Storage {
            message: message.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        ScraperError::Api {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
