//! Push-to-talk desktop client runtime: wires `AudioCapture` (C1) through
//! `SessionFramer` (C3) and `WsClient` (C4) into `OutputCommitter` (C5),
//! all driven by the shortcut engine's Begin/Finish/Cancel events and torn
//! down together on `Lifecycle` shutdown.

pub mod committer;
pub mod config;
pub mod framer;
pub mod hotkey;
pub mod logging;
pub mod mouse;
pub mod ws_client;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use capswriter_audio::CaptureHandle;
use capswriter_foundation::Lifecycle;
use capswriter_protocol::config::ClientSettings;
use capswriter_protocol::{AudioBlock, Source};
use capswriter_shortcut::{EngineEvent, KeyEvent, ShortcutEngine};
use capswriter_telemetry::ClientMetrics;
use tokio::sync::mpsc;

use committer::OutputCommitter;
use framer::SessionFramer;
use ws_client::{WsClient, WsEvent};

/// Which shortcut task_ids are still streaming (no `Finish`/`Cancel` seen
/// yet), so `OutputCommitter` knows whether to defer remote-compat output.
#[derive(Default)]
struct StreamingTasks(HashMap<String, bool>);

impl StreamingTasks {
    fn mark_streaming(&mut self, task_id: &str) {
        self.0.insert(task_id.to_string(), true);
    }

    fn mark_done(&mut self, task_id: &str) {
        self.0.remove(task_id);
    }

    fn is_streaming(&self, task_id: &str) -> bool {
        self.0.get(task_id).copied().unwrap_or(false)
    }
}

/// Runs the client until `lifecycle` observes a shutdown signal. `settings`
/// is assumed already validated (`ClientSettings::validate`).
pub async fn run(settings: ClientSettings, lifecycle: Lifecycle) -> anyhow::Result<()> {
    let metrics = Arc::new(ClientMetrics::default());

    let (block_tx, block_rx) = crossbeam_channel::bounded::<AudioBlock>(64);
    let (capture_handle, device_cfg) = CaptureHandle::spawn(
        block_tx,
        0.02,
        Duration::from_secs_f32(settings.audio_device_poll_interval_secs),
        None,
    )?;
    tracing::info!(sample_rate = device_cfg.sample_rate, "audio device open");

    let (async_block_tx, mut async_block_rx) = mpsc::channel::<AudioBlock>(64);
    let bridge_lifecycle = lifecycle.clone();
    std::thread::Builder::new()
        .name("capswriter-block-bridge".into())
        .spawn(move || {
            while !bridge_lifecycle.is_shutting_down() {
                match block_rx.recv_timeout(Duration::from_millis(200)) {
                    Ok(block) => {
                        if async_block_tx.blocking_send(block).is_err() {
                            break;
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;

    let (key_tx, key_rx) = mpsc::channel::<KeyEvent>(16);
    let hotkey_task = hotkey::spawn(settings.shortcuts.clone(), key_tx.clone());
    // rdev::listen has no graceful-stop hook; the thread is left to exit
    // with the process rather than joined on shutdown.
    let _mouse_listener = mouse::spawn(settings.shortcuts.clone(), key_tx);

    let (engine_tx, engine_rx) = crossbeam_channel::unbounded::<EngineEvent>();
    let last_voice_activity_ns = Arc::new(std::sync::atomic::AtomicU64::new(0));
    let engine = ShortcutEngine::new(
        settings.shortcuts.clone(),
        Duration::from_secs_f32(settings.threshold),
        settings.release_tail.clone(),
        last_voice_activity_ns,
    );
    let engine_lifecycle = lifecycle.clone();
    tokio::spawn(engine.run(key_rx, engine_tx, engine_lifecycle));

    let (frame_tx, frame_rx) = mpsc::channel(32);
    let (ws_event_tx, mut ws_event_rx) = mpsc::channel(32);
    let ws_client = WsClient::new(settings.server_uri.clone(), settings.secret.clone());
    let ws_lifecycle = lifecycle.clone();
    tokio::spawn(ws_client.run(frame_rx, ws_event_tx, ws_lifecycle));

    let mut framer = SessionFramer::new(
        device_cfg.sample_rate,
        settings.mic_seg_duration,
        settings.mic_seg_overlap,
        Source::Mic,
    );
    let mut committer = OutputCommitter::new(&settings)?;
    let mut streaming = StreamingTasks::default();

    loop {
        tokio::select! {
            biased;
            _ = lifecycle.wait_for_shutdown() => break,
            block = async_block_rx.recv() => {
                let Some(block) = block else { break };
                metrics.record_capture_block();
                if framer.is_active() {
                    for frame in framer.push_block(&block) {
                        metrics.record_frame_sent(frame.header.is_final);
                        let _ = frame_tx.send(frame).await;
                    }
                }
            }
            event = poll_engine_event(&engine_rx) => {
                match event {
                    Some(EngineEvent::Begin { .. }) => {
                        let task_id = framer.begin();
                        streaming.mark_streaming(&task_id);
                    }
                    Some(EngineEvent::Finish { .. }) => {
                        if let Some(frame) = framer.finish() {
                            streaming.mark_done(&frame.header.task_id);
                            metrics.record_frame_sent(true);
                            let _ = frame_tx.send(frame).await;
                        }
                    }
                    Some(EngineEvent::Cancel { .. }) => {
                        if let Some(task_id) = framer.task_id().map(str::to_string) {
                            streaming.mark_done(&task_id);
                        }
                        framer.cancel();
                    }
                    None => {}
                }
            }
            event = ws_event_rx.recv() => {
                match event {
                    Some(WsEvent::Connected) => tracing::info!("connected to recognizer"),
                    Some(WsEvent::Disconnected) => tracing::warn!("disconnected from recognizer"),
                    Some(WsEvent::Result(result)) => {
                        let is_final = result.is_final;
                        let chars = result.text.chars().count();
                        let task_streaming = streaming.is_streaming(&result.task_id) && !is_final;
                        if let Err(err) = committer.handle_result(result, task_streaming).await {
                            tracing::warn!(%err, "failed to commit recognition result");
                        } else {
                            metrics.record_commit(chars);
                        }
                    }
                    None => break,
                }
            }
        }
    }

    hotkey_task.abort();
    capture_handle.stop();
    lifecycle.cleanup();
    Ok(())
}

/// Bridges the shortcut engine's sync `crossbeam_channel::Receiver` into the
/// async select loop above without a dedicated forwarding thread; a 5ms
/// poll is cheap next to the engine's own 20ms tick.
async fn poll_engine_event(rx: &crossbeam_channel::Receiver<EngineEvent>) -> Option<EngineEvent> {
    loop {
        match rx.try_recv() {
            Ok(event) => return Some(event),
            Err(crossbeam_channel::TryRecvError::Empty) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(crossbeam_channel::TryRecvError::Disconnected) => return None,
        }
    }
}
