use anyhow::Result;
use planzy_scraper::domain::ReferenceKind;
use planzy_scraper::ingest::{IngestSettings, IngestionEngine};
use planzy_scraper::storage::{SqliteStorage, Storage};
use planzy_scraper::types::{CanonicalRecord, NameSet};
use std::sync::Arc;
use tempfile::tempdir;

fn record(i: usize) -> CanonicalRecord {
    CanonicalRecord {
        url: Some(format!("https://events.test/{i}")),
        name: format!("Concert {i}"),
        start_at: Some("1735754400".to_string()),
        place_name: Some("Hala Stulecia".to_string()),
        artist_names: NameSet::from_comma_separated("Orkiestra, Solista"),
        tag_names: NameSet::from_comma_separated("Muzyka klasyczna"),
        source_name: "eBilet".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ingested_rows_survive_reopen() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("data/planzy.db");
    let records: Vec<_> = (0..5).map(record).collect();

    {
        let storage = Arc::new(SqliteStorage::open(&db_path)?);
        let mut engine = IngestionEngine::new(storage, IngestSettings::default());
        engine.preload().await?;
        let report = engine.ingest(&records).await?;
        assert_eq!(report.succeeded, 5);
    }

    let reopened = Arc::new(SqliteStorage::open(&db_path)?);
    assert_eq!(reopened.count_events().await?, 5);
    assert_eq!(reopened.count_references(ReferenceKind::Place).await?, 1);
    assert_eq!(reopened.count_references(ReferenceKind::Artist).await?, 2);
    assert_eq!(reopened.count_references(ReferenceKind::Tag).await?, 1);

    let event = reopened
        .get_event_by_url("https://events.test/3")
        .await?
        .expect("event persisted");
    assert_eq!(event.start_at.timestamp(), 1_735_754_400);
    assert_eq!(event.end_at.timestamp(), 1_735_754_400 + 3600);
    let artists = reopened
        .get_event_reference_ids(event.id.expect("id"), ReferenceKind::Artist)
        .await?;
    assert_eq!(artists.len(), 2);

    // A second run over the same database adds nothing
    let mut engine = IngestionEngine::new(reopened.clone(), IngestSettings::default());
    engine.preload().await?;
    let report = engine.ingest(&records).await?;
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.skipped_duplicate, 5);
    assert_eq!(reopened.count_events().await?, 5);
    Ok(())
}

#[tokio::test]
async fn test_unflushed_writes_are_rolled_back_on_drop() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("planzy.db");

    {
        let storage = SqliteStorage::open(&db_path)?;
        let mut event = planzy_scraper::domain::Event::from_record(
            &record(1),
            "https://events.test/1",
            chrono::Utc::now(),
        );
        storage.create_event(&mut event).await?;
        storage.flush().await?;

        let mut lost = planzy_scraper::domain::Event::from_record(
            &record(2),
            "https://events.test/2",
            chrono::Utc::now(),
        );
        storage.create_event(&mut lost).await?;
        assert_eq!(storage.count_events().await?, 2);
    }

    let reopened = SqliteStorage::open(&db_path)?;
    assert_eq!(reopened.get_all_event_urls().await?, vec!["https://events.test/1"]);
    Ok(())
}
