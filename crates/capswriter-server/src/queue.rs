//! RecognizerQueue (C7): admission control plus the worker(s) that turn a
//! Task into a RecognitionResult or QueueAck. Model internals are an
//! explicit non-goal, so `Recognizer` is a small trait mirroring the
//! teacher's own `Transcriber` seam (`crates/app/src/stt/mod.rs`) with one
//! stub implementation instead of a real ASR backend.

use std::sync::Arc;

use capswriter_protocol::{QueueAck, QueueCounters, RecognitionResult, Task};
use capswriter_telemetry::ServerMetrics;
use parking_lot::Mutex;

/// Implemented by whatever actually turns PCM into text. Model internals are
/// out of scope here; `EchoRecognizer` below exists only to exercise the
/// queue's admission/completion contract end to end.
#[cfg_attr(test, mockall::automock)]
pub trait Recognizer: Send + Sync + 'static {
    fn recognize(&self, task: &Task) -> RecognitionResult;
}

/// Synthesizes a result whose `text` names the sample count it received.
/// Stands in for a real model the same way the teacher leaves `Transcriber`
/// unwired until a `vosk`-feature build supplies one.
pub struct EchoRecognizer;

impl Recognizer for EchoRecognizer {
    fn recognize(&self, task: &Task) -> RecognitionResult {
        RecognitionResult {
            task_id: task.header.task_id.clone(),
            duration: task.payload.len() as f32 / 16_000.0,
            time_start: task.header.time_start,
            time_submit: task.header.time_submit,
            time_complete: now_secs(),
            text: format!("[{} samples]", task.payload.len()),
            text_accu: format!("[{} samples]", task.payload.len()),
            tokens: Vec::new(),
            timestamps: Vec::new(),
            is_final: task.header.is_final,
            source: task.header.source,
        }
    }
}

fn now_secs() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Outcome of a dequeued Task, fed back to whichever of WSServer/HTTPTranscriptAPI
/// owns the originating socket_id.
pub enum RecognizerOutput {
    Result(RecognitionResult),
    Ack(QueueAck),
}

/// C7. Owns the admission counters and the bounded channel into the
/// recognizer worker thread(s). `try_enqueue` is the only admission path;
/// callers that get `false` back must drop the segment silently per §4.6's
/// admission rules.
pub struct RecognizerQueue {
    counters: Arc<Mutex<QueueCounters>>,
    task_tx: crossbeam_channel::Sender<Task>,
    queue_max_total: usize,
    queue_max_per_client: usize,
    metrics: Arc<ServerMetrics>,
}

impl RecognizerQueue {
    /// Spawns one worker thread pulling from an unbounded channel (the
    /// admission check above it is the real backpressure point, not the
    /// channel itself) and returns the queue handle plus the receiver side
    /// workers use to emit `RecognizerOutput`.
    pub fn spawn(
        recognizer: Arc<dyn Recognizer>,
        queue_max_total: usize,
        queue_max_per_client: usize,
        metrics: Arc<ServerMetrics>,
    ) -> (Self, crossbeam_channel::Receiver<(String, RecognizerOutput)>) {
        let (task_tx, task_rx) = crossbeam_channel::unbounded::<Task>();
        let (out_tx, out_rx) = crossbeam_channel::unbounded();

        std::thread::Builder::new()
            .name("recognizer-worker".into())
            .spawn(move || {
                for task in task_rx {
                    let socket_id = task.socket_id.clone();
                    let result = recognizer.recognize(&task);
                    let _ = out_tx.send((socket_id, RecognizerOutput::Result(result)));
                }
            })
            .expect("failed to spawn recognizer worker thread");

        (
            Self {
                counters: Arc::new(Mutex::new(QueueCounters::new())),
                task_tx,
                queue_max_total,
                queue_max_per_client,
                metrics,
            },
            out_rx,
        )
    }

    /// §4.6/§4.7 admission rules: final tails are always admitted; a
    /// non-final segment is rejected once either the per-client or global
    /// ceiling is reached, and the caller just drops it — the client keeps
    /// streaming and the next segment carries context.
    pub fn try_enqueue(&self, task: Task) -> bool {
        let socket_id = task.socket_id.clone();
        let mut counters = self.counters.lock();

        if !task.is_final() {
            if counters.pending_for(&socket_id) >= self.queue_max_per_client as i64 {
                tracing::warn!(socket_id = %socket_id, "dropping segment: per-client queue limit reached");
                self.metrics.record_admission(false);
                return false;
            }
            if counters.pending_total() >= self.queue_max_total as i64 {
                tracing::warn!(socket_id = %socket_id, "dropping segment: global queue limit reached");
                self.metrics.record_admission(false);
                return false;
            }
        }

        counters.admit(&socket_id);
        drop(counters);
        self.metrics.record_admission(true);
        let _ = self.task_tx.send(task);
        true
    }

    /// Decrements counters for a completed (or dropped) task. Matches by
    /// `socket_id` only — `task_id` is carried for logging, not accounting.
    pub fn complete(&self, socket_id: &str) {
        self.counters.lock().complete(socket_id);
        self.metrics.record_completion();
    }

    /// Reclaims a closed socket's pending count in one step, per §4.7's
    /// socket-close rule: subtract atomically, erase the entry. These tasks
    /// were abandoned, not completed, so only the gauge moves.
    pub fn close_socket(&self, socket_id: &str) {
        let mut counters = self.counters.lock();
        let removed = counters.pending_for(socket_id);
        counters.close_socket(socket_id);
        drop(counters);
        self.metrics
            .pending_total_gauge
            .fetch_sub(removed, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn pending_total(&self) -> i64 {
        self.counters.lock().pending_total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capswriter_protocol::{FrameHeader, Source};

    fn task(socket_id: &str, is_final: bool) -> Task {
        Task {
            header: FrameHeader {
                task_id: "t1".into(),
                seg_duration: 6.0,
                seg_overlap: 1.0,
                is_final,
                time_start: 0.0,
                time_submit: 0.0,
                source: Source::Mic,
                context: None,
            },
            payload: vec![0.0; 16_000],
            socket_id: socket_id.to_string(),
        }
    }

    #[test]
    fn non_final_segment_is_rejected_past_per_client_limit() {
        let (queue, _rx) = RecognizerQueue::spawn(Arc::new(EchoRecognizer), 100, 2, Arc::new(ServerMetrics::default()));
        assert!(queue.try_enqueue(task("a", false)));
        assert!(queue.try_enqueue(task("a", false)));
        assert!(!queue.try_enqueue(task("a", false)));
        assert_eq!(queue.pending_total(), 2);
    }

    #[test]
    fn final_segment_is_always_admitted_even_past_the_limit() {
        let (queue, _rx) = RecognizerQueue::spawn(Arc::new(EchoRecognizer), 100, 1, Arc::new(ServerMetrics::default()));
        assert!(queue.try_enqueue(task("a", false)));
        assert!(queue.try_enqueue(task("a", true)));
        assert_eq!(queue.pending_total(), 2);
    }

    #[test]
    fn close_socket_reclaims_pending_count() {
        let (queue, _rx) = RecognizerQueue::spawn(Arc::new(EchoRecognizer), 100, 10, Arc::new(ServerMetrics::default()));
        queue.try_enqueue(task("a", false));
        queue.try_enqueue(task("a", false));
        queue.close_socket("a");
        assert_eq!(queue.pending_total(), 0);
    }

    #[test]
    fn worker_thread_calls_recognize_exactly_once_per_admitted_task() {
        let mut mock = MockRecognizer::new();
        mock.expect_recognize().times(1).returning(|task| RecognitionResult {
            task_id: task.header.task_id.clone(),
            duration: 0.0,
            time_start: 0.0,
            time_submit: 0.0,
            time_complete: 0.0,
            text: "mocked".into(),
            text_accu: "mocked".into(),
            tokens: Vec::new(),
            timestamps: Vec::new(),
            is_final: true,
            source: Source::Mic,
        });

        let (queue, rx) = RecognizerQueue::spawn(Arc::new(mock), 100, 10, Arc::new(ServerMetrics::default()));
        assert!(queue.try_enqueue(task("a", true)));

        let (socket_id, output) = rx.recv_timeout(std::time::Duration::from_secs(1)).expect("worker did not emit a result");
        assert_eq!(socket_id, "a");
        match output {
            RecognizerOutput::Result(result) => assert_eq!(result.text, "mocked"),
            RecognizerOutput::Ack(_) => panic!("expected a Result output"),
        }
    }
}
