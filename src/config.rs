use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_THRESHOLD, DEFAULT_PROGRESS_EVERY, DEFAULT_WORKERS,
};
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub flush_threshold: usize,
    pub progress_every: usize,
    /// Size of the adapter worker pool, independent of how many sources run
    pub workers: usize,
    pub adapter_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            progress_every: DEFAULT_PROGRESS_EVERY,
            workers: DEFAULT_WORKERS,
            adapter_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_path: "data/planzy.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub ebilet: EbiletConfig,
    pub goingapp: GoingAppConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EbiletConfig {
    pub enabled: bool,
    pub base_url: String,
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for EbiletConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://www.ebilet.pl/api/TitleListing/Search".to_string(),
            page_size: 20,
            max_pages: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoingAppConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Substring a captured response URL must contain to be parsed
    pub response_filter: String,
    pub max_pages: usize,
}

impl Default for GoingAppConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://queue.goingapp.pl/szukaj?page=".to_string(),
            response_filter: "szukaj?page=".to_string(),
            max_pages: 4,
        }
    }
}

impl Config {
    /// Loads `config.toml` from the working directory.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads the given file, falling back to defaults when it does not exist,
    /// then applies environment overrides and validates the result.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let config_content = fs::read_to_string(path).map_err(|e| {
                ScraperError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            let config: Config = toml::from_str(&config_content)?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            warn!("Config file '{}' not found, using defaults", path.display());
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(db_path) = std::env::var("PLANZY_DATABASE_PATH") {
            if !db_path.trim().is_empty() {
                self.storage.database_path = db_path;
            }
        }
        if let Ok(workers) = std::env::var("PLANZY_WORKERS") {
            self.pipeline.workers = workers.trim().parse().map_err(|e| {
                ScraperError::Config(format!("PLANZY_WORKERS must be a number: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        for (name, value) in [
            ("pipeline.batch_size", p.batch_size),
            ("pipeline.flush_threshold", p.flush_threshold),
            ("pipeline.progress_every", p.progress_every),
            ("pipeline.workers", p.workers),
            ("sources.ebilet.page_size", self.sources.ebilet.page_size),
        ] {
            if value == 0 {
                return Err(ScraperError::Config(format!("{name} must be greater than zero")));
            }
        }
        if p.adapter_timeout_secs == Some(0) {
            return Err(ScraperError::Config(
                "pipeline.adapter_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
