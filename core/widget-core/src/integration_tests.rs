//! Cross-module scenarios over a shared in-memory namespace.

use std::sync::Arc;

use crate::engine::WidgetEngine;
use crate::error::WidgetFfiError;
use crate::habits::HabitStore;
use crate::namespace::{MemoryNamespace, HABITS_KEY, MAPPING_KEY, PENDING_KEY};
use crate::types::WidgetView;

fn setup() -> (Arc<MemoryNamespace>, WidgetEngine) {
    let ns = Arc::new(MemoryNamespace::new());
    (ns.clone(), WidgetEngine::with_namespace(ns))
}

#[test]
fn test_malformed_record_is_isolated_then_reconciled_away() {
    let (ns, engine) = setup();
    engine
        .configure_surface("1".into(), r#"{"id":"good","name":"Good"}"#.into())
        .unwrap();
    engine.set_widget_mapping("2".into(), "bad".into()).unwrap();

    let mut blob: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&ns.snapshot()[HABITS_KEY]).unwrap();
    blob.insert("bad".into(), serde_json::Value::String("{\"name\":".into()));
    ns.insert_raw(HABITS_KEY, &serde_json::Value::Object(blob).to_string());

    assert_eq!(engine.render_data("2".into()).unwrap(), WidgetView::Unconfigured);
    assert!(matches!(
        engine.on_user_complete("2".into()),
        Err(WidgetFfiError::InvalidRecord { .. })
    ));
    // The good habit is unaffected and writes keep the bad entry verbatim.
    engine.on_user_complete("1".into()).unwrap();
    assert!(ns.snapshot()[HABITS_KEY].contains(r#""bad":"{\"name\":""#));

    let affected = engine.sync_valid_ids(vec!["good".into()]).unwrap();
    assert_eq!(affected, vec!["2"]);
    assert_eq!(
        HabitStore::new(ns.clone()).all_ids().unwrap().into_iter().collect::<Vec<_>>(),
        vec!["good"]
    );
}

#[test]
fn test_saturated_tap_leaves_every_entry_untouched() {
    let (ns, engine) = setup();
    engine
        .configure_surface("1".into(), r#"{"id":"h1","name":"Read"}"#.into())
        .unwrap();
    engine.on_user_complete("1".into()).unwrap();

    let before = ns.snapshot();
    let result = engine.on_user_complete("1".into()).unwrap();
    assert!(!result.outcome.advanced);
    assert_eq!(ns.snapshot(), before);
}

#[test]
fn test_deleting_habit_keeps_queued_actions_until_drain() {
    let (ns, engine) = setup();
    engine
        .configure_surface("1".into(), r#"{"id":"h1","name":"Read","remindersPerDay":2}"#.into())
        .unwrap();
    engine.on_user_complete("1".into()).unwrap();
    engine.delete_habit("h1".into()).unwrap();

    // The raw entry still holds the id; drain filters it out.
    assert_eq!(engine.get_pending_actions().unwrap(), vec!["h1"]);
    assert!(engine.drain_pending_actions().unwrap().is_empty());
    assert!(!ns.snapshot().contains_key(PENDING_KEY));
    assert_eq!(ns.snapshot()[MAPPING_KEY], "{}");
}
