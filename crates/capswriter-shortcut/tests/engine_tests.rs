use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use capswriter_foundation::Lifecycle;
use capswriter_protocol::config::ReleaseTailConfig;
use capswriter_protocol::shortcut::{Shortcut, ShortcutKind};
use capswriter_shortcut::{EngineEvent, KeyEvent, ShortcutEngine};

fn quick_shortcut() -> Shortcut {
    Shortcut {
        key: "f9".into(),
        kind: ShortcutKind::Keyboard,
        hold_mode: false,
        suppress: false,
        enabled: true,
    }
}

#[tokio::test]
async fn full_press_past_threshold_emits_begin_then_finish() {
    let (key_tx, key_rx) = tokio::sync::mpsc::channel(8);
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let lifecycle = Lifecycle::new();

    let release_tail = ReleaseTailConfig {
        ms: 5,
        max_ms: 20,
        silence_ms: 0,
        ..ReleaseTailConfig::default()
    };
    let engine = ShortcutEngine::new(
        vec![quick_shortcut()],
        Duration::from_millis(10),
        release_tail,
        Arc::new(AtomicU64::new(0)),
    );

    let run_lifecycle = lifecycle.clone();
    let handle = tokio::spawn(engine.run(key_rx, events_tx, run_lifecycle));

    key_tx.send(KeyEvent::down("f9")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    key_tx.send(KeyEvent::up("f9")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    lifecycle.request_shutdown();
    handle.await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            EngineEvent::Begin {
                shortcut_key: "f9".into()
            },
            EngineEvent::Finish {
                shortcut_key: "f9".into()
            },
        ]
    );
}

#[tokio::test]
async fn release_before_threshold_never_emits_begin() {
    let (key_tx, key_rx) = tokio::sync::mpsc::channel(8);
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let lifecycle = Lifecycle::new();

    let engine = ShortcutEngine::new(
        vec![quick_shortcut()],
        Duration::from_secs(10),
        ReleaseTailConfig::default(),
        Arc::new(AtomicU64::new(0)),
    );

    let run_lifecycle = lifecycle.clone();
    let handle = tokio::spawn(engine.run(key_rx, events_tx, run_lifecycle));

    key_tx.send(KeyEvent::down("f9")).await.unwrap();
    key_tx.send(KeyEvent::up("f9")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;

    lifecycle.request_shutdown();
    handle.await.unwrap();

    let event = events_rx.try_recv().expect("a cancel event");
    assert_eq!(
        event,
        EngineEvent::Cancel {
            shortcut_key: "f9".into()
        }
    );
    assert!(events_rx.try_recv().is_err());
}
