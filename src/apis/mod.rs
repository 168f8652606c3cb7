pub mod ebilet;
pub mod going_app;
pub mod normalize;

use crate::app::ports::{HttpClientPort, PageCapturePort};
use crate::config::Config;
use crate::constants::{self, EBILET_SOURCE, GOINGAPP_SOURCE};
use crate::types::SourceAdapter;
use ebilet::EbiletApi;
use going_app::GoingAppCrawler;
use std::sync::Arc;
use tracing::{info, warn};

/// Fetch-side collaborators shared by the sources
#[derive(Clone)]
pub struct FetchPorts {
    pub http: Arc<dyn HttpClientPort>,
    pub pages: Arc<dyn PageCapturePort>,
}

/// Factory function to create a single source by CLI name
pub fn create_adapter(
    source_name: &str,
    config: &Config,
    ports: &FetchPorts,
) -> Option<Arc<dyn SourceAdapter>> {
    match source_name {
        EBILET_SOURCE => Some(Arc::new(EbiletApi::new(
            ports.http.clone(),
            config.sources.ebilet.clone(),
        ))),
        GOINGAPP_SOURCE => Some(Arc::new(GoingAppCrawler::new(
            ports.pages.clone(),
            config.sources.goingapp.clone(),
        ))),
        _ => None,
    }
}

fn is_enabled(source_name: &str, config: &Config) -> bool {
    match source_name {
        EBILET_SOURCE => config.sources.ebilet.enabled,
        GOINGAPP_SOURCE => config.sources.goingapp.enabled,
        _ => false,
    }
}

/// Builds the adapter list in registration order.
///
/// With no selection every enabled source runs. Selected names are matched
/// case-insensitively; unknown ones are reported and ignored.
pub fn build_adapters(
    config: &Config,
    selection: Option<&[String]>,
    ports: &FetchPorts,
) -> Vec<Arc<dyn SourceAdapter>> {
    let selected: Option<Vec<String>> =
        selection.map(|names| names.iter().map(|n| n.trim().to_lowercase()).collect());

    if let Some(names) = &selected {
        for name in names {
            if !constants::get_supported_sources().contains(&name.as_str()) {
                warn!("Unknown source '{}' ignored", name);
            }
        }
    }

    constants::get_supported_sources()
        .into_iter()
        .filter(|name| match &selected {
            Some(names) => names.iter().any(|n| n.as_str() == *name),
            None => true,
        })
        .filter(|name| {
            let enabled = is_enabled(name, config);
            if !enabled {
                info!("Source '{}' is disabled in configuration", name);
            }
            enabled
        })
        .filter_map(|name| create_adapter(name, config, ports))
        .collect()
}
