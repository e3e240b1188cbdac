use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use capswriter_foundation::Lifecycle;
use capswriter_protocol::config::ReleaseTailConfig;
use capswriter_protocol::shortcut::Shortcut;
use crossbeam_channel::Sender;
use tokio::sync::mpsc;

use crate::events::{EngineEvent, KeyEvent};
use crate::guard::SelfEventGuard;
use crate::release_tail::ReleaseTailOutcome;
use crate::task::{ShortcutTask, TaskAction};

/// How often the engine polls pending-threshold timers and finishing
/// release-tail threads. 20ms matches the release-tail poll cadence of
/// §4.2, so a finished tail is never more than one tick stale.
const TICK: Duration = Duration::from_millis(20);

/// Turns raw key events into per-shortcut sessions (C2). Owns no
/// platform key hook itself; the caller feeds it normalized
/// [`KeyEvent`]s over an mpsc channel, grounded on the same
/// `tokio::select!` + channel-forwarding shape the desktop hotkey
/// listener uses for its portal subscription.
pub struct ShortcutEngine {
    tasks: Vec<ShortcutTask>,
    threshold: Duration,
    release_tail: ReleaseTailConfig,
    last_voice_activity_ns: Arc<AtomicU64>,
    guard: SelfEventGuard,
}

impl ShortcutEngine {
    pub fn new(
        shortcuts: Vec<Shortcut>,
        threshold: Duration,
        release_tail: ReleaseTailConfig,
        last_voice_activity_ns: Arc<AtomicU64>,
    ) -> Self {
        Self {
            tasks: shortcuts.into_iter().map(ShortcutTask::new).collect(),
            threshold,
            release_tail,
            last_voice_activity_ns,
            guard: SelfEventGuard::new(),
        }
    }

    /// Runs the engine until `lifecycle` signals shutdown. Blocking
    /// calls in individual tasks (the release-tail wait) live on their
    /// own threads, so this loop only ever awaits the channel, the
    /// shutdown notification, and its own tick.
    pub async fn run(
        mut self,
        mut key_rx: mpsc::Receiver<KeyEvent>,
        events_tx: Sender<EngineEvent>,
        lifecycle: Lifecycle,
    ) {
        let mut ticker = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                biased;
                _ = lifecycle.wait_for_shutdown() => {
                    tracing::debug!("shortcut engine shutting down");
                    break;
                }
                event = key_rx.recv() => {
                    match event {
                        Some(event) => self.handle_key_event(event, &events_tx),
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.tick(&events_tx);
                }
            }
        }
    }

    fn tick(&mut self, events_tx: &Sender<EngineEvent>) {
        for task in &mut self.tasks {
            if task.threshold_elapsed_since(self.threshold)
                && task.on_threshold_elapsed() == TaskAction::Begin
            {
                let _ = events_tx.send(EngineEvent::Begin {
                    shortcut_key: task.shortcut.key.clone(),
                });
            }
            if let Some(outcome) = task.poll_finishing() {
                if outcome == ReleaseTailOutcome::Finished {
                    let _ = events_tx.send(EngineEvent::Finish {
                        shortcut_key: task.shortcut.key.clone(),
                    });
                }
            }
        }
    }

    pub fn handle_key_event(&mut self, event: KeyEvent, events_tx: &Sender<EngineEvent>) {
        if self.guard.should_ignore(&event.key) {
            return;
        }

        for task in &mut self.tasks {
            let action = if event.down {
                task.on_key_down(&event.key)
            } else {
                task.on_key_up(&event.key)
            };

            match action {
                TaskAction::Begin => {
                    let _ = events_tx.send(EngineEvent::Begin {
                        shortcut_key: task.shortcut.key.clone(),
                    });
                }
                TaskAction::CancelSilently => {
                    let _ = events_tx.send(EngineEvent::Cancel {
                        shortcut_key: task.shortcut.key.clone(),
                    });
                }
                TaskAction::CancelWithReplay => {
                    // Only the Windows low-level hook can truly block OS
                    // propagation; suppress=true on other platforms is
                    // not guaranteed (§4.2), so the replay request is
                    // informational even though we always arm the guard.
                    self.guard.arm(&task.shortcut.key);
                    let _ = events_tx.send(EngineEvent::Cancel {
                        shortcut_key: task.shortcut.key.clone(),
                    });
                }
                TaskAction::EnterFinishing => {
                    task.spawn_finishing(
                        self.release_tail.clone(),
                        self.last_voice_activity_ns.clone(),
                    );
                }
                TaskAction::ResumeFromFinishing | TaskAction::None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capswriter_protocol::shortcut::ShortcutKind;
    use std::time::Duration as StdDuration;

    fn shortcut(key: &str, hold_mode: bool, suppress: bool) -> Shortcut {
        Shortcut {
            key: key.into(),
            kind: ShortcutKind::Keyboard,
            hold_mode,
            suppress,
            enabled: true,
        }
    }

    #[test]
    fn key_down_up_below_threshold_emits_cancel_not_begin() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut engine = ShortcutEngine::new(
            vec![shortcut("caps_lock", true, true)],
            StdDuration::from_secs(10),
            ReleaseTailConfig::default(),
            Arc::new(AtomicU64::new(0)),
        );
        engine.handle_key_event(KeyEvent::down("caps_lock"), &tx);
        engine.handle_key_event(KeyEvent::up("caps_lock"), &tx);

        let event = rx.try_recv().expect("a cancel event");
        assert_eq!(
            event,
            EngineEvent::Cancel {
                shortcut_key: "caps_lock".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn self_event_guard_drops_the_replayed_key_once() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut engine = ShortcutEngine::new(
            vec![shortcut("caps_lock", true, true)],
            StdDuration::from_secs(10),
            ReleaseTailConfig::default(),
            Arc::new(AtomicU64::new(0)),
        );
        engine.handle_key_event(KeyEvent::down("caps_lock"), &tx);
        engine.handle_key_event(KeyEvent::up("caps_lock"), &tx);
        engine.guard.arm("caps_lock");

        assert!(engine.guard.should_ignore("caps_lock"));
        assert!(!engine.guard.should_ignore("caps_lock"));
    }
}
