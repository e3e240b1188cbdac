//! §4.9 Lifecycle (C9): signal handling, shutdown fan-out, LIFO cleanup hooks.
//!
//! Grounded on the teacher's `ShutdownHandler` (install a ctrl_c task, flip an
//! atomic bool, notify waiters) and extended per spec with SIGTERM on unix and
//! registered shutdown callbacks run in LIFO order.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

type ShutdownHook = Box<dyn FnOnce() + Send>;

/// Process-wide lifecycle object. Must be constructed and have
/// [`Lifecycle::install`] awaited before any subsystem starts its own event
/// loop, so a Ctrl-C pressed during startup is observed before new servers
/// bind.
#[derive(Clone)]
pub struct Lifecycle {
    shutdown_requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
    hooks: Arc<Mutex<Vec<ShutdownHook>>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            hooks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Spawns the signal-handling task. SIGINT/SIGTERM on unix, Ctrl-C on
    /// Windows; either sets the shutdown flag and wakes every waiter.
    pub fn install(&self) {
        let requested = self.shutdown_requested.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            wait_for_termination_signal().await;
            tracing::info!("shutdown signal received");
            requested.store(true, Ordering::SeqCst);
            notify.notify_waiters();
        });
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested. Safe to call repeatedly
    /// (e.g. in a `tokio::select!` alongside other work) from multiple tasks.
    pub async fn wait_for_shutdown(&self) {
        if self.is_shutting_down() {
            return;
        }
        let notified = self.notify.notified();
        tokio::pin!(notified);
        if self.is_shutting_down() {
            return;
        }
        notified.await;
    }

    /// Races `work` against shutdown, returning `None` if shutdown won.
    pub async fn race<F, T>(&self, work: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.wait_for_shutdown() => None,
            result = work => Some(result),
        }
    }

    /// Registers a callback to run during [`Lifecycle::cleanup`]. Hooks run
    /// in LIFO order (last registered, first run) so a component that
    /// registered after a dependency is already up tears down before it.
    pub fn register_on_shutdown<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.lock().push(Box::new(hook));
    }

    /// Requests shutdown without waiting for a signal (used by tests and by
    /// components that detect a fatal condition themselves).
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Runs every registered hook in LIFO order, draining the list.
    pub fn cleanup(&self) {
        let hooks: Vec<ShutdownHook> = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks.into_iter().rev() {
            hook();
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_shutdown_resolves_after_request() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.is_shutting_down());
        let waiter = lifecycle.clone();
        let handle = tokio::spawn(async move {
            waiter.wait_for_shutdown().await;
        });
        lifecycle.request_shutdown();
        handle.await.unwrap();
        assert!(lifecycle.is_shutting_down());
    }

    #[test]
    fn hooks_run_in_lifo_order() {
        let lifecycle = Lifecycle::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            lifecycle.register_on_shutdown(move || order.lock().push(i));
        }
        lifecycle.cleanup();
        assert_eq!(*order.lock(), vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn race_returns_none_when_shutdown_wins() {
        let lifecycle = Lifecycle::new();
        lifecycle.request_shutdown();
        let result = lifecycle
            .race(async {
                tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                42
            })
            .await;
        assert_eq!(result, None);
    }
}
