use crate::apis::normalize::{
    epoch_field, name_set, normalize_all, scalar_text, text_field, text_or,
};
use crate::app::ports::{CapturedResponse, PageCapturePort};
use crate::config::GoingAppConfig;
use crate::constants::{GOINGAPP_DISPLAY_NAME, GOINGAPP_SOURCE};
use crate::error::{Result, ScraperError};
use crate::types::{CanonicalRecord, RawEventData, SourceAdapter};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const EVENT_URL: &str = "https://queue.goingapp.pl/wydarzenie";
const THUMBNAIL_URL: &str =
    "https://res.cloudinary.com/dr89d8ldb/image/upload/c_fill,h_350,w_405/f_webp/q_auto:eco/v1/rundate";

/// GoingApp search pages. The listing data arrives as JSON network responses
/// while a search page loads; each further page stands in for one "load more".
pub struct GoingAppCrawler {
    capture: Arc<dyn PageCapturePort>,
    config: GoingAppConfig,
}

impl GoingAppCrawler {
    pub fn new(capture: Arc<dyn PageCapturePort>, config: GoingAppConfig) -> Self {
        Self { capture, config }
    }

    fn is_relevant(&self, response: &CapturedResponse) -> bool {
        response.url.contains(&self.config.response_filter)
            && response.status == 200
            && response.is_json()
    }

    /// Search hits, either at the top level or per result set.
    fn extract_hits(body: &Value) -> Vec<Value> {
        if let Some(hits) = body.get("hits").and_then(Value::as_array) {
            return hits.clone();
        }
        body.get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| r.get("hits").and_then(Value::as_array))
                    .flatten()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record count the source says exists, when it says so.
    fn declared_total(body: &Value) -> Option<usize> {
        let total = |node: &Value| {
            node.get("nbHits")
                .or_else(|| node.get("total"))
                .and_then(Value::as_u64)
        };
        total(body)
            .or_else(|| {
                body.get("results")
                    .and_then(Value::as_array)
                    .and_then(|results| results.iter().find_map(total))
            })
            .map(|n| n as usize)
    }

    /// Walks search pages until a page yields nothing, the declared total is
    /// reached, or the page cap is hit.
    async fn fetch_raw(&self) -> Result<Vec<RawEventData>> {
        let mut all_data = Vec::new();
        let mut declared_total = None;

        for page in 1..=self.config.max_pages {
            let url = format!("{}{}", self.config.base_url, page);
            info!("Navigating to URL: {}", url);

            let responses = self.capture.capture(&url).await?;
            let mut page_data = Vec::new();
            let mut listing_responses = 0;
            for response in &responses {
                if !self.is_relevant(response) {
                    debug!("Ignoring response from URL: {}", response.url);
                    continue;
                }
                listing_responses += 1;
                match serde_json::from_slice::<Value>(&response.body) {
                    Ok(body) => {
                        declared_total = Self::declared_total(&body).or(declared_total);
                        page_data.extend(Self::extract_hits(&body));
                    }
                    Err(e) => warn!("Error processing response from URL {}: {}", response.url, e),
                }
            }

            if listing_responses == 0 {
                warn!(
                    "No JSON listing response captured from {} ({} responses seen), stopping; \
                     the page may need a browser-backed capture",
                    url,
                    responses.len()
                );
                break;
            }
            if page_data.is_empty() {
                info!("No further results on page {}, stopping", page);
                break;
            }
            all_data.extend(page_data);

            if declared_total.map_or(false, |total| all_data.len() >= total) {
                info!("Reached declared total of {} records", all_data.len());
                break;
            }
        }

        info!("Captured {} raw events from GoingApp", all_data.len());
        Ok(all_data)
    }

    fn event_url(raw: &Value) -> Option<String> {
        let slug = text_field(raw, "slug")?;
        let rundate_slug = text_field(raw, "rundate_slug")?;
        Some(format!("{EVENT_URL}/{slug}/{rundate_slug}"))
    }

    pub fn normalize(&self, raw: &RawEventData) -> Result<CanonicalRecord> {
        if !raw.is_object() {
            return Err(ScraperError::MissingField("GoingApp hit object".into()));
        }

        let location = raw
            .get("locations_names")
            .and_then(Value::as_array)
            .and_then(|names| names.first())
            .and_then(scalar_text);

        Ok(CanonicalRecord {
            name: text_or(raw, "name_pl", "Unknown Event"),
            start_at: epoch_field(raw, "start_date_timestamp"),
            end_at: epoch_field(raw, "end_date_timestamp"),
            thumbnail_url: text_field(raw, "thumbnail")
                .map(|t| format!("{THUMBNAIL_URL}/{}", t.replace(' ', "%20")))
                .unwrap_or_else(|| "Unknown Thumbnail".to_string()),
            url: Self::event_url(raw),
            location_text: location.unwrap_or_else(|| "Unknown Location".to_string()),
            category_text: text_or(raw, "category_name", "Unknown Category"),
            description: text_or(raw, "description_pl", "No Description"),
            source_name: GOINGAPP_DISPLAY_NAME.to_string(),
            place_name: text_field(raw, "place_name"),
            artist_names: name_set(raw, "artists_names"),
            tag_names: name_set(raw, "tags_names"),
        })
    }
}

#[async_trait::async_trait]
impl SourceAdapter for GoingAppCrawler {
    fn source_name(&self) -> &'static str {
        GOINGAPP_SOURCE
    }

    #[instrument(skip(self))]
    async fn fetch_and_normalize(&self) -> Result<Vec<CanonicalRecord>> {
        let raw = self.fetch_raw().await?;
        Ok(normalize_all(GOINGAPP_SOURCE, &raw, |event| self.normalize(event)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns canned responses per page URL; unknown pages capture nothing
    struct StubCapture {
        pages: HashMap<String, Vec<CapturedResponse>>,
        visited: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageCapturePort for StubCapture {
        async fn capture(&self, page_url: &str) -> Result<Vec<CapturedResponse>> {
            self.visited.lock().unwrap().push(page_url.to_string());
            Ok(self.pages.get(page_url).cloned().unwrap_or_default())
        }
    }

    fn json_response(url: &str, body: Value) -> CapturedResponse {
        CapturedResponse {
            url: url.to_string(),
            status: 200,
            content_type: "application/json; charset=utf-8".to_string(),
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    fn hit(slug: &str) -> Value {
        json!({"name_pl": slug, "slug": slug, "rundate_slug": "2025-01-01"})
    }

    fn crawler(pages: Vec<(usize, Vec<CapturedResponse>)>) -> (GoingAppCrawler, Arc<StubCapture>) {
        let config = GoingAppConfig {
            base_url: "https://going.test/szukaj?page=".to_string(),
            ..GoingAppConfig::default()
        };
        let capture = Arc::new(StubCapture {
            pages: pages
                .into_iter()
                .map(|(page, responses)| (format!("{}{}", config.base_url, page), responses))
                .collect(),
            visited: Mutex::new(Vec::new()),
        });
        (GoingAppCrawler::new(capture.clone(), config), capture)
    }

    #[tokio::test]
    async fn test_only_matching_json_responses_are_parsed() {
        let page_url = "https://going.test/szukaj?page=1";
        let (crawler, _) = crawler(vec![(
            1,
            vec![
                json_response(page_url, json!({"hits": [hit("a")]})),
                json_response("https://going.test/analytics", json!({"hits": [hit("x")]})),
                CapturedResponse {
                    content_type: "text/html".to_string(),
                    ..json_response(page_url, json!({"hits": [hit("y")]}))
                },
                CapturedResponse {
                    status: 500,
                    ..json_response(page_url, json!({"hits": [hit("z")]}))
                },
            ],
        )]);

        let records = crawler.fetch_and_normalize().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "a");
    }

    #[tokio::test]
    async fn test_stops_when_declared_total_reached() {
        let url = |p: usize| format!("https://going.test/szukaj?page={p}");
        let (crawler, capture) = crawler(vec![
            (1, vec![json_response(&url(1), json!({"results": [{"hits": [hit("a"), hit("b")], "nbHits": 3}]}))]),
            (2, vec![json_response(&url(2), json!({"results": [{"hits": [hit("c")], "nbHits": 3}]}))]),
            (3, vec![json_response(&url(3), json!({"results": [{"hits": [hit("d")], "nbHits": 3}]}))]),
        ]);

        let records = crawler.fetch_and_normalize().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(capture.visited.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stops_on_page_without_results() {
        let (crawler, capture) = crawler(vec![(
            1,
            vec![json_response("https://going.test/szukaj?page=1", json!({"hits": [hit("a")]}))],
        )]);
        let records = crawler.fetch_and_normalize().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(capture.visited.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_html_only_page_yields_nothing_and_stops() {
        let page_url = "https://going.test/szukaj?page=1";
        let (crawler, capture) = crawler(vec![(
            1,
            vec![CapturedResponse {
                url: page_url.to_string(),
                status: 200,
                content_type: "text/html; charset=utf-8".to_string(),
                body: b"<html><body>app shell</body></html>".to_vec(),
            }],
        )]);

        let records = crawler.fetch_and_normalize().await.unwrap();
        assert!(records.is_empty());
        assert_eq!(*capture.visited.lock().unwrap(), vec![page_url.to_string()]);
    }

    #[tokio::test]
    async fn test_json_page_with_no_hits_stops_without_error() {
        let url = |p: usize| format!("https://going.test/szukaj?page={p}");
        let (crawler, capture) = crawler(vec![
            (1, vec![json_response(&url(1), json!({"hits": [hit("a")]}))]),
            (2, vec![json_response(&url(2), json!({"hits": [], "nbHits": 1}))]),
            (3, vec![json_response(&url(3), json!({"hits": [hit("late")]}))]),
        ]);

        let records = crawler.fetch_and_normalize().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(capture.visited.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_normalize_maps_going_fields() {
        let (crawler, _) = crawler(vec![]);
        let record = crawler
            .normalize(&json!({
                "name_pl": "Jazz Night",
                "start_date_timestamp": 1735754400,
                "end_date_timestamp": null,
                "artists_names": ["Trio", "Trio", "Solo"],
                "locations_names": ["Kraków"],
                "place_name": "Klub",
                "category_name": "Koncerty",
                "tags_names": ["jazz"],
                "thumbnail": "jazz night.jpg",
                "slug": "jazz-night",
                "rundate_slug": "krakow-2025"
            }))
            .unwrap();

        assert_eq!(record.start_at.as_deref(), Some("1735754400"));
        assert_eq!(record.end_at, None);
        assert_eq!(record.artist_names.len(), 2);
        assert_eq!(record.location_text, "Kraków");
        assert_eq!(record.place_name.as_deref(), Some("Klub"));
        assert!(record.thumbnail_url.ends_with("/rundate/jazz%20night.jpg"));
        assert_eq!(
            record.url.as_deref(),
            Some("https://queue.goingapp.pl/wydarzenie/jazz-night/krakow-2025")
        );
        assert_eq!(record.description, "No Description");
        assert_eq!(record.source_name, "GoingApp");
    }
}
