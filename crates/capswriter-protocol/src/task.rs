use crate::frame::{FrameHeader, Source};
use serde::{Deserialize, Serialize};

/// Server-side queue element: a Frame plus the socket it arrived on.
/// Ordering invariant: for a given `(socket_id, task_id)` pair tasks are
/// consumed by the recognizer in enqueue order.
#[derive(Debug, Clone)]
pub struct Task {
    pub header: FrameHeader,
    pub payload: Vec<f32>,
    pub socket_id: String,
}

impl Task {
    pub fn task_id(&self) -> &str {
        &self.header.task_id
    }

    pub fn is_final(&self) -> bool {
        self.header.is_final
    }
}

/// Recognizer output, also the queue element flowing server -> network ->
/// client. `text` is a plain concatenation for live display; `text_accu` is
/// timestamp-aligned and intended for diary/archival consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub task_id: String,
    pub duration: f32,
    pub time_start: f64,
    pub time_submit: f64,
    pub time_complete: f64,
    pub text: String,
    pub text_accu: String,
    pub tokens: Vec<String>,
    pub timestamps: Vec<f32>,
    pub is_final: bool,
    pub source: Source,
}

/// Reason a QueueAck carries `dropped=true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Expired,
    Superseded,
    ModelError,
}

/// Emitted by the recognizer for every Task, including dropped ones, so the
/// queue can reconcile its admission counters regardless of whether a
/// RecognitionResult was ever produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueAck {
    pub task_id: String,
    pub socket_id: String,
    pub dropped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DropReason>,
}

impl QueueAck {
    pub fn completed(task_id: impl Into<String>, socket_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            socket_id: socket_id.into(),
            dropped: false,
            reason: None,
        }
    }

    pub fn dropped(
        task_id: impl Into<String>,
        socket_id: impl Into<String>,
        reason: DropReason,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            socket_id: socket_id.into(),
            dropped: true,
            reason: Some(reason),
        }
    }
}
