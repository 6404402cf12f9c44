use annolog_core::{Body, EntityId, IdRef, Operation, Verb};
use annolog_engine::{LedgerEvent, LedgerSnapshot, NoticeLevel, StepOutcome};
use annolog_harness::{TestSession, box_type, init_tracing};
use annolog_storage::Method;
use serde_json::{Value, json};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn assert_consistent(snapshot: &LedgerSnapshot) {
    assert_eq!(snapshot.forward.len(), snapshot.backward.len());
    assert!(snapshot.cursor <= snapshot.len());
}

fn target(op: &Operation) -> Option<EntityId> {
    op.id().and_then(IdRef::known)
}

fn box_body(x: f64) -> Body {
    Body::new()
        .with("x", x)
        .with("y", 0.2)
        .with("width", 0.3)
        .with("height", 0.4)
}

// ============================================================================
// Create / undo / redo
// ============================================================================

#[tokio::test]
async fn create_then_undo_deletes_server_entity() -> TestResult {
    init_tracing();
    let session = TestSession::new()?;

    let responses = session
        .ledger
        .create("Localizations", box_body(0.1), box_type())
        .await?;
    let id = responses[0].id.ok_or("create returned no id")?;

    let snapshot = session.ledger.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.cursor, 1);
    assert!(session.entity("Localization", id)?.is_some());

    let outcome = session.ledger.undo().await?;
    assert!(matches!(outcome, StepOutcome::Applied(_)));
    assert_eq!(session.ledger.snapshot().await.cursor, 0);
    assert!(session.entity("Localization", id)?.is_none());

    let mutations = session.mutations()?;
    assert_eq!(mutations[0], (Method::Post, "/Localizations".to_string()));
    assert_eq!(mutations[1], (Method::Delete, format!("/Localization/{id}")));
    Ok(())
}

#[tokio::test]
async fn redo_recreates_and_rebinds_the_new_id() -> TestResult {
    init_tracing();
    let session = TestSession::new()?;

    let first = session
        .ledger
        .create("Localizations", box_body(0.1), box_type())
        .await?[0]
        .id
        .ok_or("no id")?;
    session.ledger.undo().await?;

    let StepOutcome::Applied(responses) = session.ledger.redo().await? else {
        return Err("redo had nothing to apply".into());
    };
    let second = responses[0].id.ok_or("no id")?;
    assert_ne!(first, second);

    let snapshot = session.ledger.snapshot().await;
    assert_eq!(target(&snapshot.backward[0].ops()[0]), Some(second));
    assert_eq!(session.ids("Localization")?, vec![second]);

    session.ledger.undo().await?;
    assert!(session.ids("Localization")?.is_empty());
    Ok(())
}

#[tokio::test]
async fn undo_and_redo_at_the_bounds_are_no_ops() -> TestResult {
    let session = TestSession::new()?;

    assert!(matches!(session.ledger.undo().await?, StepOutcome::Empty));
    assert!(matches!(session.ledger.redo().await?, StepOutcome::Empty));
    assert!(session.transport.sent().is_empty());

    session
        .ledger
        .create("Localizations", box_body(0.1), box_type())
        .await?;
    assert!(matches!(session.ledger.redo().await?, StepOutcome::Empty));
    assert!(!session.ledger.can_redo().await);
    assert!(session.ledger.can_undo().await);
    Ok(())
}

// ============================================================================
// Update / delete pre-images
// ============================================================================

#[tokio::test]
async fn update_records_nested_attribute_inverse() -> TestResult {
    let session = TestSession::new()?;
    let id = session.seed(
        "Localization",
        42,
        json!({"type": 1, "x": 0.5, "attributes": {"color": "blue", "label": "car"}}),
    )?;

    session
        .ledger
        .update(
            "Localization",
            id,
            Body::new().with("attributes", json!({"color": "red"})),
            box_type(),
        )
        .await?;

    let snapshot = session.ledger.snapshot().await;
    let inverse = snapshot.backward[0].ops()[0]
        .body()
        .ok_or("inverse has no body")?
        .resolve()?;
    assert_eq!(Value::Object(inverse), json!({"attributes": {"color": "blue"}}));

    let current = session.entity("Localization", id)?.ok_or("missing")?;
    assert_eq!(current["attributes"], json!({"color": "red", "label": "car"}));

    session.ledger.undo().await?;
    let current = session.entity("Localization", id)?.ok_or("missing")?;
    assert_eq!(current["attributes"], json!({"color": "blue", "label": "car"}));
    Ok(())
}

#[tokio::test]
async fn delete_records_a_full_recreation() -> TestResult {
    let session = TestSession::new()?;
    let id = session.seed(
        "Localization",
        42,
        json!({"type": 1, "media": 7, "frame": 3, "x": 0.1, "y": 0.2, "width": 0.3, "height": 0.4}),
    )?;

    session.ledger.delete("Localization", id, box_type()).await?;
    assert!(session.entity("Localization", id)?.is_none());

    let snapshot = session.ledger.snapshot().await;
    let recreate = &snapshot.backward[0].ops()[0];
    assert_eq!(recreate.verb(), Verb::Create);
    assert_eq!(recreate.collection().map(|c| c.as_str()), Some("Localizations"));
    let body = recreate.body().ok_or("no body")?.resolve()?;
    for key in ["x", "y", "width", "height", "media", "frame", "type"] {
        assert!(body.contains_key(key), "recreation lacks {key}");
    }
    assert!(!body.contains_key("id"));

    let StepOutcome::Applied(responses) = session.ledger.undo().await? else {
        return Err("undo had nothing to apply".into());
    };
    let restored = responses[0].id.ok_or("no id")?;
    assert_ne!(restored, id);
    let current = session.entity("Localization", restored)?.ok_or("missing")?;
    assert_eq!(current["width"], json!(0.3));

    // the forward delete now names the restored entity
    let snapshot = session.ledger.snapshot().await;
    assert_eq!(target(&snapshot.forward[0].ops()[0]), Some(restored));
    session.ledger.redo().await?;
    assert!(session.ids("Localization")?.is_empty());
    Ok(())
}

// ============================================================================
// Truncation
// ============================================================================

#[tokio::test]
async fn new_edit_after_undo_discards_the_redo_branch() -> TestResult {
    let session = TestSession::new()?;
    let id = session.seed("Localization", 1, json!({"x": 0.0}))?;

    session.ledger.update("Localization", id, Body::new().with("x", 1), box_type()).await?;
    session.ledger.update("Localization", id, Body::new().with("x", 2), box_type()).await?;
    session.ledger.undo().await?;
    session.ledger.update("Localization", id, Body::new().with("x", 3), box_type()).await?;

    let snapshot = session.ledger.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.cursor, 2);
    let last = snapshot.forward[1].ops()[0].body().ok_or("no body")?;
    assert_eq!(last.get("x"), Some(&json!(3)));
    assert_consistent(&snapshot);
    Ok(())
}

#[tokio::test]
async fn k_undos_then_an_edit_drop_k_groups() -> TestResult {
    let session = TestSession::new()?;
    for i in 0..4 {
        session
            .ledger
            .create("Localizations", box_body(f64::from(i)), box_type())
            .await?;
    }
    for _ in 0..3 {
        session.ledger.undo().await?;
        assert_consistent(&session.ledger.snapshot().await);
    }

    session
        .ledger
        .create("Localizations", box_body(9.0), box_type())
        .await?;
    let snapshot = session.ledger.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.cursor, 2);
    assert!(matches!(session.ledger.redo().await?, StepOutcome::Empty));
    assert_eq!(session.ids("Localization")?.len(), 2);
    Ok(())
}

// ============================================================================
// Notifications
// ============================================================================

#[tokio::test]
async fn create_brackets_the_request_and_announces_success() -> TestResult {
    let mut session = TestSession::new()?;
    session
        .ledger
        .create("Localizations", box_body(0.1), box_type())
        .await?;

    let events = session.drain_events();
    assert!(matches!(events[0], LedgerEvent::MutationInFlight { enabled: true }));
    assert!(matches!(events[1], LedgerEvent::MutationInFlight { enabled: false }));
    let LedgerEvent::Applied(applied) = &events[2] else {
        return Err(format!("expected applied, got {:?}", events[2]).into());
    };
    assert_eq!(applied.verb, Verb::Create);
    assert_eq!(applied.type_id, Some(1));
    assert!(applied.body.get("id").is_some());
    let LedgerEvent::Notice(notice) = &events[3] else {
        return Err(format!("expected notice, got {:?}", events[3]).into());
    };
    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(notice.message, "Box created!");
    Ok(())
}

#[tokio::test]
async fn simple_update_announces_the_request_body_once() -> TestResult {
    let mut session = TestSession::new()?;
    let id = session.seed("Localization", 5, json!({"x": 0.0}))?;

    session
        .ledger
        .update("Localizations", id, Body::new().with("x", 0.9), box_type())
        .await?;
    let applied = session.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].verb, Verb::Update);
    assert_eq!(applied[0].id, Some(id));
    assert_eq!(applied[0].body, json!({"x": 0.9}));

    // undo refreshes observers of the update too
    session.ledger.undo().await?;
    let applied = session.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].body, json!({"x": 0.0}));
    Ok(())
}

#[tokio::test]
async fn versioned_update_announces_the_confirmed_object() -> TestResult {
    let mut session = TestSession::versioned(&["State"])?;
    let id = session.seed("State", 8, json!({"type": 9, "frame": 1}))?;

    session
        .ledger
        .update("States", id, Body::new().with("frame", 2), box_type())
        .await?;

    let applied = session.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].type_id, Some(9));
    assert_eq!(applied[0].id, Some(id));
    assert_eq!(applied[0].body["frame"], json!(2));
    assert_eq!(applied[0].body["id"], json!(8));
    Ok(())
}

#[tokio::test]
async fn edits_mark_the_ledger_dirty() -> TestResult {
    let session = TestSession::new()?;
    assert!(!session.ledger.has_edits());
    session.ledger.undo().await?;
    assert!(!session.ledger.has_edits());

    session
        .ledger
        .create("Localizations", box_body(0.1), box_type())
        .await?;
    assert!(session.ledger.has_edits());
    Ok(())
}
