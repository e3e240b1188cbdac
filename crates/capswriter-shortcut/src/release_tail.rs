use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use capswriter_foundation::Clock;
use capswriter_protocol::config::ReleaseTailConfig;

/// Reports how long the input has been silent, in milliseconds. A
/// separate trait from `Clock` because the release tail measures
/// silence against the capture pipeline's wall-clock VAD timestamp, not
/// against the monotonic instant the engine's own timer runs on.
pub trait SilenceSource: Send + Sync {
    fn silence_ms(&self) -> u64;
}

/// Wraps the `last_voice_activity_ns` atomic AudioCapture publishes.
pub struct CaptureSilenceSource {
    last_voice_activity_ns: Arc<AtomicU64>,
}

impl CaptureSilenceSource {
    pub fn new(last_voice_activity_ns: Arc<AtomicU64>) -> Self {
        Self {
            last_voice_activity_ns,
        }
    }
}

impl SilenceSource for CaptureSilenceSource {
    fn silence_ms(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let last = self.last_voice_activity_ns.load(Ordering::Relaxed);
        now.saturating_sub(last) / 1_000_000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseTailOutcome {
    Finished,
    Cancelled,
}

/// Runs the §4.2 release-tail wait: hold `finishing` for at least
/// `config.ms`, then keep polling every 20ms while both elapsed time is
/// under `config.max_ms` and the input is still within
/// `config.silence_ms` of the last voice activity. `cancelled` lets a
/// re-press during `finishing` abort the tail early.
pub fn run_release_tail(
    clock: &dyn Clock,
    config: &ReleaseTailConfig,
    silence: &dyn SilenceSource,
    cancelled: &AtomicBool,
) -> ReleaseTailOutcome {
    if !config.enabled || config.ms == 0 {
        return ReleaseTailOutcome::Finished;
    }

    let start = clock.now();
    clock.sleep(Duration::from_millis(config.ms));

    loop {
        if cancelled.load(Ordering::Relaxed) {
            return ReleaseTailOutcome::Cancelled;
        }
        if clock.now().duration_since(start) >= Duration::from_millis(config.max_ms) {
            return ReleaseTailOutcome::Finished;
        }
        if silence.silence_ms() >= config.silence_ms {
            return ReleaseTailOutcome::Finished;
        }
        clock.sleep(Duration::from_millis(20));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capswriter_foundation::TestClock;

    struct FixedSilence(AtomicU64);

    impl SilenceSource for FixedSilence {
        fn silence_ms(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn disabled_release_tail_finishes_immediately() {
        let clock = TestClock::new();
        let config = ReleaseTailConfig {
            enabled: false,
            ..ReleaseTailConfig::default()
        };
        let silence = FixedSilence(AtomicU64::new(0));
        let cancelled = AtomicBool::new(false);
        let outcome = run_release_tail(&clock, &config, &silence, &cancelled);
        assert_eq!(outcome, ReleaseTailOutcome::Finished);
    }

    #[test]
    fn finishes_once_silence_threshold_is_reached() {
        let clock = TestClock::new();
        let config = ReleaseTailConfig::default();
        // Already well past the silence threshold by the time the
        // minimum hold elapses.
        let silence = FixedSilence(AtomicU64::new(config.silence_ms + 50));
        let cancelled = AtomicBool::new(false);
        let outcome = run_release_tail(&clock, &config, &silence, &cancelled);
        assert_eq!(outcome, ReleaseTailOutcome::Finished);
    }

    #[test]
    fn finishes_at_max_ms_even_if_still_noisy() {
        let clock = TestClock::new();
        let config = ReleaseTailConfig {
            max_ms: 40,
            ms: 20,
            silence_ms: 5_000,
            ..ReleaseTailConfig::default()
        };
        let silence = FixedSilence(AtomicU64::new(0));
        let cancelled = AtomicBool::new(false);
        let outcome = run_release_tail(&clock, &config, &silence, &cancelled);
        assert_eq!(outcome, ReleaseTailOutcome::Finished);
    }

    #[test]
    fn cancellation_wins_over_an_otherwise_ongoing_tail() {
        let clock = TestClock::new();
        let config = ReleaseTailConfig::default();
        let silence = FixedSilence(AtomicU64::new(0));
        let cancelled = AtomicBool::new(true);
        let outcome = run_release_tail(&clock, &config, &silence, &cancelled);
        assert_eq!(outcome, ReleaseTailOutcome::Cancelled);
    }
}
