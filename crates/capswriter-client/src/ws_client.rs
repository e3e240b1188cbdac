//! WSClient (C4): the single persistent WebSocket connection to the
//! recognizer, with `hello` authentication and exponential-backoff
//! reconnection. Frames are sent as a JSON text message immediately
//! followed by a binary message carrying the PCM payload.

use std::time::Duration;

use capswriter_foundation::Lifecycle;
use capswriter_protocol::{Frame, RecognitionResult};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const MIN_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub enum WsEvent {
    Connected,
    Disconnected,
    Result(RecognitionResult),
}

pub struct WsClient {
    url: String,
    secret: String,
}

impl WsClient {
    pub fn new(url: String, secret: String) -> Self {
        Self { url, secret }
    }

    /// Drives the reconnect loop until `lifecycle` requests shutdown.
    /// Audio frames arriving on `frame_rx` while disconnected are dropped —
    /// §4.4 specifies no retry of audio; the user re-presses.
    pub async fn run(
        self,
        mut frame_rx: mpsc::Receiver<Frame>,
        event_tx: mpsc::Sender<WsEvent>,
        lifecycle: Lifecycle,
    ) {
        let mut backoff = MIN_BACKOFF;
        loop {
            if lifecycle.is_shutting_down() {
                return;
            }
            match self.connect_and_serve(&mut frame_rx, &event_tx, &lifecycle).await {
                Ok(()) => return,
                Err(err) => {
                    tracing::warn!(%err, "websocket session ended, reconnecting");
                    let _ = event_tx.send(WsEvent::Disconnected).await;
                    let jitter = Duration::from_millis(rand::random::<u64>() % 250);
                    tokio::select! {
                        _ = lifecycle.wait_for_shutdown() => return,
                        _ = tokio::time::sleep(backoff + jitter) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_and_serve(
        &self,
        frame_rx: &mut mpsc::Receiver<Frame>,
        event_tx: &mpsc::Sender<WsEvent>,
        lifecycle: &Lifecycle,
    ) -> anyhow::Result<()> {
        let (stream, _) = tokio_tungstenite::connect_async(&self.url).await?;
        let (mut write, mut read) = stream.split();

        let hello = serde_json::json!({ "secret": self.secret });
        write.send(Message::Text(hello.to_string())).await?;
        let _ = event_tx.send(WsEvent::Connected).await;

        loop {
            tokio::select! {
                biased;
                _ = lifecycle.wait_for_shutdown() => return Ok(()),
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { return Ok(()) };
                    write.send(Message::Text(frame.header_json()?)).await?;
                    write
                        .send(Message::Binary(Frame::payload_bytes(&frame.payload)))
                        .await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<RecognitionResult>(&text) {
                                Ok(result) => {
                                    let _ = event_tx.send(WsEvent::Result(result)).await;
                                }
                                Err(err) => {
                                    tracing::warn!(%err, "failed to parse server message");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                    }
                }
            }
        }
    }
}
