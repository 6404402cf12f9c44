use annolog_core::Body;
use annolog_engine::session::{SESSION_END_KEY, SESSION_START_KEY};
use annolog_engine::{EditSession, LedgerConfig, StepOutcome};
use annolog_harness::{TestSession, box_type, init_tracing};
use annolog_storage::{Method, SqliteBackend};
use serde_json::json;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn box_body() -> Body {
    Body::new()
        .with("x", 0.1)
        .with("y", 0.1)
        .with("width", 0.5)
        .with("height", 0.5)
}

// ============================================================================
// Edit sessions
// ============================================================================

#[tokio::test]
async fn closing_without_edits_touches_nothing() -> TestResult {
    let session = TestSession::new()?;
    let media = session.seed("Media", 5, json!({"name": "clip.mp4", "attributes": {}}))?;

    let config = LedgerConfig {
        close_jobs: vec!["tracker".into()],
        ..LedgerConfig::default()
    };
    let edit = EditSession::start(media, session.ledger.clone(), session.store.clone(), &config)?;
    assert_eq!(edit.close().await?, None);
    assert!(session.mutations()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn closing_an_edited_session_stamps_media_and_launches_jobs() -> TestResult {
    init_tracing();
    let session = TestSession::new()?;
    let media = session.seed("Media", 5, json!({"name": "clip.mp4", "attributes": {"fps": 30}}))?;

    let config = LedgerConfig::from_json(r#"{"close_jobs": ["tracker", "thumbnails"]}"#)?;
    let edit = EditSession::start(media, session.ledger.clone(), session.store.clone(), &config)?;
    session
        .ledger
        .create("Localizations", box_body().with("media", media.get()), box_type())
        .await?;

    let summary = edit.close().await?.ok_or("edited session produced no summary")?;
    assert_eq!(summary.media, media);
    assert!(summary.ended_at_ms >= summary.started_at_ms);
    assert_eq!(summary.jobs.len(), 2);

    let stored = session.entity("Media", media)?.ok_or("missing media")?;
    assert_eq!(stored["attributes"]["fps"], json!(30));
    assert_eq!(stored["attributes"][SESSION_START_KEY], json!(summary.started_at_ms));
    assert_eq!(stored["attributes"][SESSION_END_KEY], json!(summary.ended_at_ms));

    let job = session.entity("Job", summary.jobs[0])?.ok_or("missing job")?;
    assert_eq!(job["algorithm_name"], json!("tracker"));
    assert_eq!(job["media_ids"], json!([5]));

    let mutations = session.mutations()?;
    assert!(mutations.contains(&(Method::Patch, "/Media/5".to_string())));
    assert_eq!(
        mutations.iter().filter(|(_, path)| path == "/Jobs").count(),
        2
    );
    Ok(())
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn depth_limit_forgets_the_oldest_entries() -> TestResult {
    let session = TestSession::with_config(&LedgerConfig {
        max_depth: Some(2),
        ..LedgerConfig::default()
    })?;
    for _ in 0..3 {
        session
            .ledger
            .create("Localizations", box_body(), box_type())
            .await?;
    }

    let snapshot = session.ledger.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.cursor, 2);

    session.ledger.undo().await?;
    session.ledger.undo().await?;
    assert!(matches!(session.ledger.undo().await?, StepOutcome::Empty));
    assert_eq!(session.ids("Localization")?.len(), 1);
    Ok(())
}

#[test]
fn config_rejects_unknown_shapes() {
    assert!(LedgerConfig::from_json(r#"{"max_depth": "ten"}"#).is_err());
    let config = LedgerConfig::from_json("{}").unwrap();
    assert_eq!(config, LedgerConfig::default());
}

// ============================================================================
// On-disk backend
// ============================================================================

#[tokio::test]
async fn on_disk_backend_keeps_entities_and_request_log() -> TestResult {
    let session = TestSession::on_disk()?;
    let id = session
        .ledger
        .create("Localizations", box_body(), box_type())
        .await?[0]
        .id
        .ok_or("no id")?;
    session
        .ledger
        .update("Localization", id, Body::new().with("x", 0.4), box_type())
        .await?;

    let path = session.db_path().ok_or("not on disk")?;
    let reopened = SqliteBackend::open(&path)?;
    assert_eq!(reopened.schema_version()?, 1);
    let stored = reopened.entity("Localization", id)?.ok_or("missing")?;
    assert_eq!(stored["x"], json!(0.4));
    assert!(stored.contains_key("modified_datetime"));

    let methods: Vec<Method> = reopened.requests()?.into_iter().map(|r| r.method).collect();
    assert_eq!(methods, vec![Method::Post, Method::Get, Method::Patch]);
    Ok(())
}
