//! Concurrency tests over the file namespace.
//!
//! Each worker opens its own `FileNamespace` handle on the same directory, the
//! way the app and each widget extension do. The lock file is the only thing
//! they share.

use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::tempdir;
use widget_core::{StorageConfig, WidgetEngine};

const WORKERS: usize = 4;
const TAPS_PER_WORKER: usize = 10;

fn engine_at(root: &std::path::Path) -> WidgetEngine {
    WidgetEngine::with_storage(StorageConfig::with_root(root.to_path_buf())).unwrap()
}

#[test]
fn test_concurrent_taps_lose_no_increments() {
    let temp = tempdir().unwrap();
    let quota = WORKERS * TAPS_PER_WORKER;
    engine_at(temp.path())
        .save_habit_data(
            "h1".to_string(),
            format!(r#"{{"name":"Water","remindersPerDay":{}}}"#, quota),
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(WORKERS));
    let workers: Vec<_> = (0..WORKERS)
        .map(|_| {
            let root = temp.path().to_path_buf();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let engine = engine_at(&root);
                barrier.wait();
                for _ in 0..TAPS_PER_WORKER {
                    assert!(engine.toggle_completion("h1".to_string()).unwrap().advanced);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let engine = engine_at(temp.path());
    let record = engine.get_habit("h1".to_string()).unwrap();
    assert_eq!(record.daily_completions as usize, quota);
    assert!(record.is_completed_today);
    assert_eq!(record.current_streak, 1);
    assert_eq!(engine.get_pending_actions().unwrap().len(), quota);
}

#[test]
fn test_taps_racing_a_drain_are_never_lost() {
    let temp = tempdir().unwrap();
    let quota = WORKERS * TAPS_PER_WORKER;
    let app = engine_at(temp.path());
    app.save_habit_data(
        "h1".to_string(),
        format!(r#"{{"name":"Water","remindersPerDay":{}}}"#, quota),
    )
    .unwrap();

    let widgets: Vec<_> = (0..WORKERS)
        .map(|_| {
            let root = temp.path().to_path_buf();
            thread::spawn(move || {
                let engine = engine_at(&root);
                for _ in 0..TAPS_PER_WORKER {
                    engine.toggle_completion("h1".to_string()).unwrap();
                }
            })
        })
        .collect();

    // Raw outbox contents, so every individual tap is counted.
    let mut drained = 0;
    while widgets.iter().any(|w| !w.is_finished()) {
        drained += app.outbox().drain().unwrap().len();
    }
    for widget in widgets {
        widget.join().unwrap();
    }
    drained += app.outbox().drain().unwrap().len();

    assert_eq!(drained, quota);
}

#[test]
fn test_delete_while_tapping_leaves_consistent_state() {
    let temp = tempdir().unwrap();
    let app = engine_at(temp.path());
    app.configure_surface(
        "1".to_string(),
        r#"{"id":"h1","name":"Read","remindersPerDay":1000}"#.to_string(),
    )
    .unwrap();

    let root = temp.path().to_path_buf();
    let widget = thread::spawn(move || {
        let engine = engine_at(&root);
        for _ in 0..50 {
            match engine.on_user_complete("1".to_string()) {
                Ok(result) => assert_eq!(result.habit_id, "h1"),
                Err(widget_core::WidgetFfiError::NotFound { .. }) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
    });

    app.delete_habit("h1".to_string()).unwrap();
    widget.join().unwrap();

    // Whatever interleaving happened, the habit and its binding are gone together.
    assert!(app.get_widget_mapping().unwrap().is_empty());
    assert!(app.get_habit("h1".to_string()).is_err());
    assert!(app.drain_pending_actions().unwrap().is_empty());
}
