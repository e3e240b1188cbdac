//! Foundation crate integration tests: clock abstraction, error composition,
//! process state machine, and lifecycle shutdown fan-out.

use capswriter_foundation::clock::{real_clock, test_clock, Clock};
use capswriter_foundation::error::{AudioError, CoreError, RecoveryStrategy};
use capswriter_foundation::lifecycle::Lifecycle;
use capswriter_foundation::state::{ProcessState, StateManager};
use std::time::{Duration, Instant};

#[test]
fn real_clock_now_returns_current_time() {
    let clock = real_clock();
    let before = Instant::now();
    let clock_time = clock.now();
    let after = Instant::now();
    assert!(clock_time >= before);
    assert!(clock_time <= after);
}

#[test]
fn test_clock_advances_on_sleep() {
    let clock = test_clock();
    let t0 = clock.now();
    clock.sleep(Duration::from_secs(5));
    assert!(clock.now() >= t0 + Duration::from_secs(5));
}

#[test]
fn device_disconnected_recovers_via_retry() {
    let err = CoreError::Audio(AudioError::DeviceDisconnected);
    assert!(matches!(
        err.recovery_strategy(),
        RecoveryStrategy::Retry { .. }
    ));
}

#[test]
fn fatal_error_is_not_recoverable() {
    let err = CoreError::Fatal("unrecoverable".into());
    assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Fatal));
}

#[test]
fn process_state_follows_initializing_running_stopping_stopped() {
    let mgr = StateManager::new();
    assert_eq!(mgr.current(), ProcessState::Initializing);
    mgr.transition(ProcessState::Running).unwrap();
    mgr.transition(ProcessState::Stopping).unwrap();
    mgr.transition(ProcessState::Stopped).unwrap();
    assert_eq!(mgr.current(), ProcessState::Stopped);
}

#[tokio::test]
async fn lifecycle_cleanup_hooks_run_lifo() {
    use parking_lot::Mutex;
    use std::sync::Arc;

    let lifecycle = Lifecycle::new();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let o1 = order.clone();
    lifecycle.register_on_shutdown(move || o1.lock().push("audio"));
    let o2 = order.clone();
    lifecycle.register_on_shutdown(move || o2.lock().push("queue"));
    let o3 = order.clone();
    lifecycle.register_on_shutdown(move || o3.lock().push("ws"));

    lifecycle.cleanup();
    assert_eq!(*order.lock(), vec!["ws", "queue", "audio"]);
}
