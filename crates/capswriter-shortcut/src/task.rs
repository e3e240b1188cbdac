use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use capswriter_foundation::RealClock;
use capswriter_protocol::config::ReleaseTailConfig;
use capswriter_protocol::shortcut::{Shortcut, ShortcutState};
use crossbeam_channel::Receiver;

use crate::combo::ComboTracker;
use crate::release_tail::{run_release_tail, CaptureSilenceSource, ReleaseTailOutcome};

/// What the engine should do in response to a key event, decided by
/// `ShortcutTask::on_key_down`/`on_key_up` before any thread is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    None,
    Begin,
    CancelSilently,
    CancelWithReplay,
    EnterFinishing,
    ResumeFromFinishing,
}

/// Owns one shortcut's session state and combo tracking. The release
/// tail itself runs on a dedicated thread (see `ShortcutTask::spawn_finishing`)
/// so the engine's event loop never blocks waiting it out.
pub struct ShortcutTask {
    pub shortcut: Shortcut,
    state: ShortcutState,
    combo: ComboTracker,
    pending_since: Option<Instant>,
    finishing_cancel: Option<Arc<AtomicBool>>,
    finishing_outcome_rx: Option<Receiver<ReleaseTailOutcome>>,
}

impl ShortcutTask {
    pub fn new(shortcut: Shortcut) -> Self {
        Self {
            shortcut,
            state: ShortcutState::Idle,
            combo: ComboTracker::new(),
            pending_since: None,
            finishing_cancel: None,
            finishing_outcome_rx: None,
        }
    }

    pub fn state(&self) -> ShortcutState {
        self.state
    }

    fn members(&self) -> Vec<&str> {
        self.shortcut.combo_members()
    }

    /// Advances the state machine for a key-down event. Returns the
    /// action the caller (the engine) must perform.
    pub fn on_key_down(&mut self, key: &str) -> TaskAction {
        if !self.shortcut.enabled {
            return TaskAction::None;
        }
        let members = self.members();
        let satisfied = self.combo.press(&members, key);
        if !satisfied {
            return TaskAction::None;
        }

        match self.state {
            ShortcutState::Idle => {
                self.state = ShortcutState::Pending;
                self.pending_since = Some(Instant::now());
                TaskAction::None
            }
            ShortcutState::Finishing => {
                if let Some(cancel) = self.finishing_cancel.take() {
                    cancel.store(true, Ordering::Relaxed);
                }
                self.state = ShortcutState::Recording;
                TaskAction::ResumeFromFinishing
            }
            _ => TaskAction::None,
        }
    }

    /// Call once `threshold` seconds have elapsed since `pending_since`
    /// without a release. The engine owns the timer; this just performs
    /// the transition.
    pub fn on_threshold_elapsed(&mut self) -> TaskAction {
        if self.state != ShortcutState::Pending {
            return TaskAction::None;
        }
        self.state = ShortcutState::Recording;
        self.pending_since = None;
        TaskAction::Begin
    }

    pub fn threshold_elapsed_since(&self, threshold: Duration) -> bool {
        matches!(self.pending_since, Some(since) if since.elapsed() >= threshold)
    }

    /// Advances the state machine for a key-up event.
    pub fn on_key_up(&mut self, key: &str) -> TaskAction {
        let members = self.members();
        let broke_combo = self.combo.release(&members, key);
        if !broke_combo {
            return TaskAction::None;
        }

        match self.state {
            ShortcutState::Pending => {
                self.pending_since = None;
                self.state = ShortcutState::Idle;
                if self.shortcut.hold_mode && self.shortcut.suppress {
                    TaskAction::CancelWithReplay
                } else {
                    TaskAction::CancelSilently
                }
            }
            ShortcutState::Recording => {
                self.state = ShortcutState::Finishing;
                TaskAction::EnterFinishing
            }
            _ => TaskAction::None,
        }
    }

    /// Spawns the release-tail wait on a dedicated thread. The outcome is
    /// picked up later by `poll_finishing`, which the engine calls on its
    /// own tick so the event loop never blocks waiting it out. No-op
    /// unless the task is currently `Finishing`.
    pub fn spawn_finishing(
        &mut self,
        release_tail: ReleaseTailConfig,
        last_voice_activity_ns: Arc<AtomicU64>,
    ) {
        if self.state != ShortcutState::Finishing {
            return;
        }
        let cancel = Arc::new(AtomicBool::new(false));
        self.finishing_cancel = Some(cancel.clone());

        let (tx, rx) = crossbeam_channel::bounded(1);
        self.finishing_outcome_rx = Some(rx);

        let shortcut_key = self.shortcut.key.clone();
        thread::Builder::new()
            .name(format!("shortcut-tail-{shortcut_key}"))
            .spawn(move || {
                let clock = RealClock::new();
                let silence = CaptureSilenceSource::new(last_voice_activity_ns);
                let outcome = run_release_tail(&clock, &release_tail, &silence, &cancel);
                let _ = tx.send(outcome);
            })
            .expect("failed to spawn release-tail thread");
    }

    /// Non-blocking check for a resolved release tail. Returns the
    /// outcome once, resetting the task to `idle` if it is still in
    /// `Finishing` (a re-press may have already moved it to `Recording`,
    /// in which case the stale `Cancelled` outcome is discarded here
    /// without disturbing the new state).
    pub fn poll_finishing(&mut self) -> Option<ReleaseTailOutcome> {
        let outcome = match self.finishing_outcome_rx.as_ref() {
            Some(rx) => rx.try_recv().ok()?,
            None => return None,
        };
        self.finishing_outcome_rx = None;
        self.finishing_cancel = None;
        if self.state == ShortcutState::Finishing {
            self.state = ShortcutState::Idle;
        }
        self.combo.clear();
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capswriter_protocol::shortcut::ShortcutKind;

    fn test_shortcut(hold_mode: bool, suppress: bool) -> Shortcut {
        keyed_shortcut("caps_lock", hold_mode, suppress)
    }

    fn keyed_shortcut(key: &str, hold_mode: bool, suppress: bool) -> Shortcut {
        Shortcut {
            key: key.into(),
            kind: ShortcutKind::Keyboard,
            hold_mode,
            suppress,
            enabled: true,
        }
    }

    #[test]
    fn press_then_threshold_then_release_walks_idle_to_finishing() {
        let mut task = ShortcutTask::new(test_shortcut(true, true));
        assert_eq!(task.on_key_down("caps_lock"), TaskAction::None);
        assert_eq!(task.state(), ShortcutState::Pending);

        assert_eq!(task.on_threshold_elapsed(), TaskAction::Begin);
        assert_eq!(task.state(), ShortcutState::Recording);

        assert_eq!(task.on_key_up("caps_lock"), TaskAction::EnterFinishing);
        assert_eq!(task.state(), ShortcutState::Finishing);
    }

    #[test]
    fn quick_tap_before_threshold_cancels_with_replay_when_suppressed_hold_mode() {
        let mut task = ShortcutTask::new(test_shortcut(true, true));
        task.on_key_down("caps_lock");
        assert_eq!(task.on_key_up("caps_lock"), TaskAction::CancelWithReplay);
        assert_eq!(task.state(), ShortcutState::Idle);
    }

    #[test]
    fn quick_tap_without_suppress_cancels_silently() {
        let mut task = ShortcutTask::new(keyed_shortcut("r", false, false));
        task.on_key_down("r");
        assert_eq!(task.on_key_up("r"), TaskAction::CancelSilently);
    }

    #[test]
    fn re_press_during_finishing_resumes_recording() {
        let mut task = ShortcutTask::new(test_shortcut(true, true));
        task.on_key_down("caps_lock");
        task.on_threshold_elapsed();
        task.on_key_up("caps_lock");
        assert_eq!(task.state(), ShortcutState::Finishing);

        assert_eq!(
            task.on_key_down("caps_lock"),
            TaskAction::ResumeFromFinishing
        );
        assert_eq!(task.state(), ShortcutState::Recording);
    }

    #[test]
    fn spawned_finishing_resolves_to_idle_once_polled() {
        let mut task = ShortcutTask::new(test_shortcut(true, true));
        task.on_key_down("caps_lock");
        task.on_threshold_elapsed();
        task.on_key_up("caps_lock");
        assert_eq!(task.state(), ShortcutState::Finishing);

        let fast_tail = ReleaseTailConfig {
            ms: 1,
            max_ms: 10,
            silence_ms: 0,
            ..ReleaseTailConfig::default()
        };
        task.spawn_finishing(fast_tail, Arc::new(AtomicU64::new(0)));

        let outcome = loop {
            if let Some(outcome) = task.poll_finishing() {
                break outcome;
            }
            thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(outcome, ReleaseTailOutcome::Finished);
        assert_eq!(task.state(), ShortcutState::Idle);
    }

    #[test]
    fn disabled_shortcut_never_transitions() {
        let mut shortcut = test_shortcut(true, true);
        shortcut.enabled = false;
        let mut task = ShortcutTask::new(shortcut);
        assert_eq!(task.on_key_down("caps_lock"), TaskAction::None);
        assert_eq!(task.state(), ShortcutState::Idle);
    }
}
