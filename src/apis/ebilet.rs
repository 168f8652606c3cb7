use crate::apis::normalize::{
    iso_field_to_epoch, join_taxonomy, name_set, nested_text, normalize_all, text_field, text_or,
};
use crate::app::ports::HttpClientPort;
use crate::config::EbiletConfig;
use crate::constants::{EBILET_DISPLAY_NAME, EBILET_SOURCE};
use crate::error::{Result, ScraperError};
use crate::types::{CanonicalRecord, NameSet, RawEventData, SourceAdapter};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument};

const SITE_URL: &str = "https://www.ebilet.pl";
const MEDIA_URL: &str = "https://www.ebilet.pl/media";

/// eBilet listing API: offset-paginated JSON with the records under `titles`.
pub struct EbiletApi {
    http: Arc<dyn HttpClientPort>,
    config: EbiletConfig,
}

impl EbiletApi {
    pub fn new(http: Arc<dyn HttpClientPort>, config: EbiletConfig) -> Self {
        Self { http, config }
    }

    fn page_url(&self, top: usize) -> String {
        format!(
            "{}?currentTab=2&sort=1&top={}&size={}",
            self.config.base_url, top, self.config.page_size
        )
    }

    /// Polls pages until one comes back empty, the API answers with a
    /// non-success status, or the page cap is reached.
    async fn fetch_raw(&self) -> Result<Vec<RawEventData>> {
        let mut all_data = Vec::new();
        let mut top = 0;

        for _ in 0..self.config.max_pages {
            let url = self.page_url(top);
            info!("Fetching data from URL: {}", url);

            let resp = self.http.get(&url).await?;
            if !resp.is_success() {
                error!("Failed to fetch data. HTTP status code: {}", resp.status);
                break;
            }

            let body: Value = serde_json::from_slice(&resp.bytes)?;
            match body.get("titles").and_then(Value::as_array) {
                Some(titles) if !titles.is_empty() => {
                    all_data.extend(titles.iter().cloned());
                    top += self.config.page_size;
                }
                _ => break,
            }
        }

        info!("Fetched {} raw events from eBilet", all_data.len());
        Ok(all_data)
    }

    /// Direct `linkTo` when present, otherwise built from category,
    /// subcategory and slug.
    fn event_url(raw: &Value) -> Option<String> {
        if let Some(link) = text_field(raw, "linkTo") {
            return Some(link);
        }
        let category = text_field(raw, "category")?;
        let subcategory = text_field(raw, "subcategory")?.replace('"', "");
        let slug = text_field(raw, "slug")?;
        Some(format!("{SITE_URL}/{category}/{subcategory}/{slug}"))
    }

    pub fn normalize(&self, raw: &RawEventData) -> Result<CanonicalRecord> {
        if !raw.is_object() {
            return Err(ScraperError::MissingField("eBilet title object".into()));
        }

        let tags = join_taxonomy([
            text_field(raw, "subcategoryName"),
            text_field(raw, "category"),
            text_field(raw, "subcategory"),
        ]);

        Ok(CanonicalRecord {
            name: text_or(raw, "title", "Unknown Event"),
            start_at: iso_field_to_epoch(raw, "dateFrom"),
            end_at: iso_field_to_epoch(raw, "dateTo"),
            thumbnail_url: text_field(raw, "imageLandscape")
                .map(|path| format!("{MEDIA_URL}{path}"))
                .unwrap_or_else(|| "Unknown Thumbnail".to_string()),
            url: Self::event_url(raw),
            location_text: nested_text(raw, &["nextEventPlace", "city"])
                .unwrap_or_else(|| "Unknown City".to_string()),
            category_text: text_or(raw, "categoryName", "Unknown Category"),
            description: text_or(raw, "metaDescription", "No Description"),
            source_name: EBILET_DISPLAY_NAME.to_string(),
            place_name: nested_text(raw, &["nextEventPlace", "customName"]),
            artist_names: name_set(raw, "artists"),
            tag_names: NameSet::from_comma_separated(&tags),
        })
    }
}

#[async_trait::async_trait]
impl SourceAdapter for EbiletApi {
    fn source_name(&self) -> &'static str {
        EBILET_SOURCE
    }

    #[instrument(skip(self))]
    async fn fetch_and_normalize(&self) -> Result<Vec<CanonicalRecord>> {
        let raw = self.fetch_raw().await?;
        Ok(normalize_all(EBILET_SOURCE, &raw, |event| self.normalize(event)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves canned pages in order and records the requested URLs
    struct StubHttp {
        pages: Mutex<Vec<HttpGetResult>>,
        requested: Mutex<Vec<String>>,
    }

    impl StubHttp {
        fn new(pages: Vec<(u16, Value)>) -> Self {
            let mut pages: Vec<HttpGetResult> = pages
                .into_iter()
                .map(|(status, body)| HttpGetResult {
                    status,
                    bytes: serde_json::to_vec(&body).unwrap(),
                    content_type: "application/json".to_string(),
                })
                .collect();
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClientPort for StubHttp {
        async fn get(&self, url: &str) -> Result<HttpGetResult> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ScraperError::api("no more stub pages"))
        }
    }

    fn config() -> EbiletConfig {
        EbiletConfig {
            base_url: "https://api.test/Search".to_string(),
            page_size: 2,
            ..EbiletConfig::default()
        }
    }

    fn title(slug: &str) -> Value {
        json!({
            "title": format!("Title {slug}"),
            "linkTo": format!("https://www.ebilet.pl/x/{slug}"),
        })
    }

    #[tokio::test]
    async fn test_pages_until_empty_titles() {
        let http = Arc::new(StubHttp::new(vec![
            (200, json!({"titles": [title("a"), title("b")]})),
            (200, json!({"titles": [title("c")]})),
            (200, json!({"titles": []})),
        ]));
        let api = EbiletApi::new(http.clone(), config());

        let records = api.fetch_and_normalize().await.unwrap();

        let urls: Vec<_> = records.iter().filter_map(|r| r.url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.ebilet.pl/x/a",
                "https://www.ebilet.pl/x/b",
                "https://www.ebilet.pl/x/c"
            ]
        );
        let requested = http.requested.lock().unwrap().clone();
        assert_eq!(requested.len(), 3);
        assert!(requested[1].ends_with("top=2&size=2"));
    }

    #[tokio::test]
    async fn test_non_success_status_ends_paging() {
        let http = Arc::new(StubHttp::new(vec![
            (200, json!({"titles": [title("a")]})),
            (503, json!({})),
        ]));
        let api = EbiletApi::new(http, config());
        let records = api.fetch_and_normalize().await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_page_cap_bounds_the_loop() {
        let http = Arc::new(StubHttp::new(vec![
            (200, json!({"titles": [title("a")]})),
            (200, json!({"titles": [title("b")]})),
        ]));
        let api = EbiletApi::new(
            http.clone(),
            EbiletConfig {
                max_pages: 1,
                ..config()
            },
        );
        let records = api.fetch_and_normalize().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(http.requested.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_url_synthesized_when_link_is_null_literal() {
        let api = EbiletApi::new(Arc::new(StubHttp::new(vec![])), config());
        let record = api
            .normalize(&json!({
                "title": "Koncert",
                "linkTo": "null",
                "category": "muzyka",
                "subcategory": "\"rock\"",
                "slug": "band-tour",
            }))
            .unwrap();
        assert_eq!(
            record.url.as_deref(),
            Some("https://www.ebilet.pl/muzyka/rock/band-tour")
        );
    }

    #[test]
    fn test_url_absent_when_path_components_missing() {
        let api = EbiletApi::new(Arc::new(StubHttp::new(vec![])), config());
        let record = api.normalize(&json!({"title": "No link"})).unwrap();
        assert_eq!(record.url, None);
    }
}
