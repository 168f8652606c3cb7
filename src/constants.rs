/// Source name constants to ensure consistency across the codebase.
/// The CLI names select adapters; the display names end up in `Event.source`.

// CLI names (used with --sources)
pub const EBILET_SOURCE: &str = "ebilet";
pub const GOINGAPP_SOURCE: &str = "goingapp";

// Display names stored on events
pub const EBILET_DISPLAY_NAME: &str = "eBilet";
pub const GOINGAPP_DISPLAY_NAME: &str = "GoingApp";

// Literal some sources emit instead of omitting a value
pub const NULL_LITERAL: &str = "null";

// Engine-level fallbacks, applied when a record reaches storage with a blank field
pub const DEFAULT_EVENT_NAME: &str = "Unknown Event";
pub const DEFAULT_THUMBNAIL: &str = "No thumbnail";
pub const DEFAULT_LOCATION: &str = "Unknown Location";
pub const DEFAULT_CATEGORY: &str = "Unknown Category";
pub const DEFAULT_DESCRIPTION: &str = "No description available";
pub const DEFAULT_SOURCE: &str = "Unknown Source";

// Ingestion cadence
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;
pub const DEFAULT_PROGRESS_EVERY: usize = 50;
pub const DEFAULT_WORKERS: usize = 5;

/// Get all supported source names, in registration order
pub fn get_supported_sources() -> Vec<&'static str> {
    vec![EBILET_SOURCE, GOINGAPP_SOURCE]
}
