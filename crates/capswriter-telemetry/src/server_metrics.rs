use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Cross-thread server-side metrics. `RecognizerQueue` (C7) owns the actual
/// `pending_total`/`pending_by_socket` admission-control state (its
/// invariants are asserted there, see §8); this struct only mirrors
/// aggregate counters for observability, the way the teacher's
/// `PipelineMetrics` separates "is speech active" state from its counters.
#[derive(Clone)]
pub struct ServerMetrics {
    pub tasks_admitted_total: Arc<AtomicU64>,
    pub tasks_dropped_total: Arc<AtomicU64>,
    pub tasks_completed_total: Arc<AtomicU64>,
    pub pending_total_gauge: Arc<AtomicI64>,

    pub ws_connections_active: Arc<AtomicI64>,
    pub ws_connections_total: Arc<AtomicU64>,

    pub http_requests_total: Arc<AtomicU64>,
    pub http_requests_failed: Arc<AtomicU64>,
    pub http_requests_timed_out: Arc<AtomicU64>,

    pub translate_requests_total: Arc<AtomicU64>,
    pub translate_failures_total: Arc<AtomicU64>,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self {
            tasks_admitted_total: Arc::new(AtomicU64::new(0)),
            tasks_dropped_total: Arc::new(AtomicU64::new(0)),
            tasks_completed_total: Arc::new(AtomicU64::new(0)),
            pending_total_gauge: Arc::new(AtomicI64::new(0)),
            ws_connections_active: Arc::new(AtomicI64::new(0)),
            ws_connections_total: Arc::new(AtomicU64::new(0)),
            http_requests_total: Arc::new(AtomicU64::new(0)),
            http_requests_failed: Arc::new(AtomicU64::new(0)),
            http_requests_timed_out: Arc::new(AtomicU64::new(0)),
            translate_requests_total: Arc::new(AtomicU64::new(0)),
            translate_failures_total: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl ServerMetrics {
    pub fn record_admission(&self, admitted: bool) {
        if admitted {
            self.tasks_admitted_total.fetch_add(1, Ordering::Relaxed);
            self.pending_total_gauge.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_dropped_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_completion(&self) {
        self.tasks_completed_total.fetch_add(1, Ordering::Relaxed);
        self.pending_total_gauge.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_ws_connect(&self) {
        self.ws_connections_active.fetch_add(1, Ordering::Relaxed);
        self.ws_connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ws_disconnect(&self) {
        self.ws_connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_failure(&self) {
        self.http_requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_timeout(&self) {
        self.http_requests_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_translate(&self, success: bool) {
        self.translate_requests_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.translate_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }
}
