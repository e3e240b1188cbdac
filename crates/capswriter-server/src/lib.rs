//! Recognizer-queue network service: wires WSServer (C6) and, if enabled,
//! HTTPTranscriptAPI (C8) onto RecognizerQueue (C7), all under one
//! `Lifecycle`. A single dispatcher task drains the recognizer's output
//! channel, applies the translate-prefix intercept to final results, and
//! routes each one to either a waiting HTTP request or a live WS socket.

pub mod config;
pub mod http_api;
pub mod logging;
pub mod queue;
pub mod translate;
pub mod ws_server;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use capswriter_foundation::Lifecycle;
use capswriter_protocol::config::{HttpApiConfig, ServerSettings, TranslateConfig};
use capswriter_protocol::RecognitionResult;
use capswriter_telemetry::ServerMetrics;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use queue::{EchoRecognizer, Recognizer, RecognizerOutput, RecognizerQueue};

/// Shared across every connection/request handler: the admission queue,
/// metrics, translate config, and the two routing tables (live WS sockets,
/// pending HTTP transcript futures) the dispatcher consults.
pub struct ServerState {
    pub(crate) secret: String,
    pub(crate) http: HttpApiConfig,
    pub(crate) translate: TranslateConfig,
    pub(crate) queue: Arc<RecognizerQueue>,
    pub(crate) metrics: Arc<ServerMetrics>,
    pub(crate) sockets: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
    pub(crate) http_waiters: Mutex<HashMap<String, oneshot::Sender<RecognitionResult>>>,
}

pub async fn run(settings: ServerSettings, lifecycle: Lifecycle) -> anyhow::Result<()> {
    run_with_recognizer(settings, lifecycle, Arc::new(EchoRecognizer)).await
}

/// Split out so tests (and a future real-model build) can swap in a
/// different `Recognizer` without touching the wiring below.
pub async fn run_with_recognizer(
    settings: ServerSettings,
    lifecycle: Lifecycle,
    recognizer: Arc<dyn Recognizer>,
) -> anyhow::Result<()> {
    let metrics = Arc::new(ServerMetrics::default());
    let (queue, out_rx) = RecognizerQueue::spawn(
        recognizer,
        settings.queue_max_total,
        settings.queue_max_per_client,
        metrics.clone(),
    );
    let queue = Arc::new(queue);

    let state = Arc::new(ServerState {
        secret: settings.secret.clone(),
        http: settings.http.clone(),
        translate: settings.translate.clone(),
        queue: queue.clone(),
        metrics: metrics.clone(),
        sockets: Mutex::new(HashMap::new()),
        http_waiters: Mutex::new(HashMap::new()),
    });

    let (async_out_tx, mut async_out_rx) = mpsc::unbounded_channel::<(String, RecognizerOutput)>();
    let bridge_lifecycle = lifecycle.clone();
    std::thread::Builder::new()
        .name("recognizer-output-bridge".into())
        .spawn(move || loop {
            match out_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(item) => {
                    if async_out_tx.send(item).is_err() {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    if bridge_lifecycle.is_shutting_down() {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        })?;

    let dispatcher_state = state.clone();
    let dispatcher = tokio::spawn(async move {
        while let Some((socket_id, output)) = async_out_rx.recv().await {
            dispatch(&dispatcher_state, socket_id, output).await;
        }
    });

    let ws_router = Router::new().route("/", get(ws_server::upgrade)).with_state(state.clone());
    let ws_addr = format!("{}:{}", settings.addr, settings.port);
    let ws_listener = tokio::net::TcpListener::bind(&ws_addr).await?;
    tracing::info!(addr = %ws_addr, "websocket recognizer listening");
    let ws_lifecycle = lifecycle.clone();
    let ws_server_task = tokio::spawn(async move {
        let result = axum::serve(ws_listener, ws_router)
            .with_graceful_shutdown(async move { ws_lifecycle.wait_for_shutdown().await })
            .await;
        if let Err(err) = result {
            tracing::error!(%err, "websocket server exited with error");
        }
    });

    let http_server_task = if settings.http.enable {
        let max_upload_bytes = (settings.http.max_upload_mb.max(1) * 1024 * 1024) as usize;
        let http_router = Router::new()
            .route("/api/healthz", get(http_api::healthz))
            .route("/api/transcript", post(http_api::transcript))
            .layer(DefaultBodyLimit::max(max_upload_bytes))
            .with_state(state.clone());
        let http_addr = format!("{}:{}", settings.http.addr, settings.http.port);
        let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;
        tracing::info!(addr = %http_addr, "http transcript api listening");
        let http_lifecycle = lifecycle.clone();
        Some(tokio::spawn(async move {
            let result = axum::serve(http_listener, http_router)
                .with_graceful_shutdown(async move { http_lifecycle.wait_for_shutdown().await })
                .await;
            if let Err(err) = result {
                tracing::error!(%err, "http transcript server exited with error");
            }
        }))
    } else {
        tracing::info!("http transcript api disabled");
        None
    };

    lifecycle.wait_for_shutdown().await;
    let _ = ws_server_task.await;
    if let Some(task) = http_server_task {
        let _ = task.await;
    }
    dispatcher.abort();
    lifecycle.cleanup();
    Ok(())
}

/// Routes one recognizer output: HTTP waiters take priority over the live
/// socket table, matching the Python original's short-circuit. Either way
/// the queue's pending count is reconciled exactly once.
async fn dispatch(state: &Arc<ServerState>, socket_id: String, output: RecognizerOutput) {
    match output {
        RecognizerOutput::Result(mut result) => {
            let http_waiter_exists = state.http_waiters.lock().contains_key(&result.task_id);
            if http_waiter_exists {
                state.queue.complete(&socket_id);
                if result.is_final {
                    if let Some(tx) = state.http_waiters.lock().remove(&result.task_id) {
                        result.text = translate::maybe_translate(&result.text, &state.translate, &state.metrics).await;
                        let _ = tx.send(result);
                    }
                }
                return;
            }

            state.queue.complete(&socket_id);
            if result.is_final {
                result.text = translate::maybe_translate(&result.text, &state.translate, &state.metrics).await;
            }

            let sender = state.sockets.lock().get(&socket_id).cloned();
            match sender {
                Some(sender) => {
                    let payload = serde_json::to_string(&result).unwrap_or_default();
                    let _ = sender.send(Message::Text(payload));
                }
                None => {
                    tracing::warn!(socket_id = %socket_id, task_id = %result.task_id, "client socket missing, dropping result");
                }
            }
        }
        RecognizerOutput::Ack(ack) => {
            state.queue.complete(&socket_id);
            if ack.dropped {
                tracing::info!(task_id = %ack.task_id, socket_id = %socket_id, reason = ?ack.reason, "segment dropped");
            }
        }
    }
}
