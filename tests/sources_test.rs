use anyhow::Result;
use async_trait::async_trait;
use planzy_scraper::apis::{build_adapters, FetchPorts};
use planzy_scraper::app::ports::{CapturedResponse, HttpClientPort, HttpGetResult, PageCapturePort};
use planzy_scraper::config::Config;
use planzy_scraper::domain::ReferenceKind;
use planzy_scraper::error::{Result as ScraperResult, ScraperError};
use planzy_scraper::pipeline::Pipeline;
use planzy_scraper::storage::{InMemoryStorage, Storage};
use serde_json::{json, Value};
use std::sync::Arc;

/// eBilet listing: one page of titles at offset 0, empty afterwards
struct EbiletFixture;

#[async_trait]
impl HttpClientPort for EbiletFixture {
    async fn get(&self, url: &str) -> ScraperResult<HttpGetResult> {
        let body = if url.contains("top=0&") {
            json!({
                "titles": [
                    {
                        "title": "Dawid Podsiadło",
                        "dateFrom": "2025-06-01T20:00:00",
                        "dateTo": "2025-06-01T23:00:00",
                        "imageLandscape": "/img/dawid.jpg",
                        "linkTo": "null",
                        "category": "muzyka",
                        "subcategory": "\"pop\"",
                        "slug": "dawid-podsiadlo",
                        "categoryName": "Muzyka",
                        "subcategoryName": "Pop",
                        "metaDescription": "Trasa koncertowa",
                        "artists": ["Dawid Podsiadło"],
                        "nextEventPlace": {"city": "Warszawa", "customName": "PGE Narodowy"}
                    },
                    {
                        "title": "Bez adresu",
                        "linkTo": null
                    }
                ]
            })
        } else {
            json!({"titles": []})
        };
        Ok(HttpGetResult {
            status: 200,
            bytes: serde_json::to_vec(&body)?,
            content_type: "application/json".to_string(),
        })
    }
}

/// GoingApp search: the first page carries hits, later pages nothing
struct GoingFixture;

fn hits_page(url: &str, hits: Value) -> ScraperResult<CapturedResponse> {
    Ok(CapturedResponse {
        url: url.to_string(),
        status: 200,
        content_type: "application/json".to_string(),
        body: serde_json::to_vec(&json!({"results": [{"hits": hits}]}))?,
    })
}

#[async_trait]
impl PageCapturePort for GoingFixture {
    async fn capture(&self, page_url: &str) -> ScraperResult<Vec<CapturedResponse>> {
        if page_url.ends_with("page=1") {
            Ok(vec![hits_page(
                page_url,
                json!([{
                    "name_pl": "Open'er Festival",
                    "start_date_timestamp": 1751500800,
                    "artists_names": ["Dawid Podsiadło", "Headliner"],
                    "locations_names": ["Gdynia"],
                    "place_name": "Lotnisko Gdynia-Kosakowo",
                    "category_name": "Festiwale",
                    "tags_names": ["Pop", "festiwal"],
                    "thumbnail": "openers 2025.jpg",
                    "slug": "opener",
                    "rundate_slug": "gdynia-2025"
                }]),
            )?])
        } else {
            Ok(vec![hits_page(page_url, json!([]))?])
        }
    }
}

struct Unreachable;

#[async_trait]
impl PageCapturePort for Unreachable {
    async fn capture(&self, _page_url: &str) -> ScraperResult<Vec<CapturedResponse>> {
        Err(ScraperError::api("browser failed to start"))
    }
}

#[tokio::test]
async fn test_both_sources_flow_into_one_store() -> Result<()> {
    let config = Config::default();
    let ports = FetchPorts {
        http: Arc::new(EbiletFixture),
        pages: Arc::new(GoingFixture),
    };
    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = Pipeline::new(&config, storage.clone());

    let report = pipeline
        .run(build_adapters(&config, None, &ports), None)
        .await?;

    assert_eq!(report.merged_records, 3);
    assert_eq!(report.ingest.succeeded, 2);
    assert_eq!(report.ingest.skipped_missing_url, 1);
    assert!(report.sources.iter().all(|s| s.error.is_none()));

    let ebilet = storage
        .get_event_by_url("https://www.ebilet.pl/muzyka/pop/dawid-podsiadlo")
        .await?
        .expect("eBilet event stored");
    assert_eq!(ebilet.source, "eBilet");
    assert_eq!(ebilet.location, "Warszawa");
    assert_eq!(ebilet.thumbnail_url, "https://www.ebilet.pl/media/img/dawid.jpg");
    assert_eq!(ebilet.end_at.timestamp() - ebilet.start_at.timestamp(), 3 * 3600);

    let going = storage
        .get_event_by_url("https://queue.goingapp.pl/wydarzenie/opener/gdynia-2025")
        .await?
        .expect("GoingApp event stored");
    assert_eq!(going.source, "GoingApp");
    assert_eq!(going.start_at.timestamp(), 1_751_500_800);

    // The artist both sources mention is one row linked to both events
    let shared = storage
        .get_reference_by_name(ReferenceKind::Artist, "Dawid Podsiadło")
        .await?
        .expect("artist stored");
    let events = storage
        .get_events_by_reference(ReferenceKind::Artist, shared.id.expect("id"))
        .await?;
    assert_eq!(events.len(), 2);

    // "Pop" arrives as a tag from both sources
    assert_eq!(storage.count_references(ReferenceKind::Artist).await?, 2);
    assert!(storage
        .get_reference_by_name(ReferenceKind::Tag, "Pop")
        .await?
        .is_some());
    assert_eq!(storage.count_references(ReferenceKind::Place).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_source_does_not_block_the_other() -> Result<()> {
    let config = Config::default();
    let ports = FetchPorts {
        http: Arc::new(EbiletFixture),
        pages: Arc::new(Unreachable),
    };
    let storage = Arc::new(InMemoryStorage::new());
    let pipeline = Pipeline::new(&config, storage.clone());

    let report = pipeline
        .run(build_adapters(&config, None, &ports), None)
        .await?;

    assert_eq!(report.sources.len(), 2);
    assert!(report.sources[0].error.is_none());
    assert!(report.sources[1]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("browser failed to start")));
    assert_eq!(report.ingest.succeeded, 1);
    assert_eq!(storage.count_events().await?, 1);
    Ok(())
}
