//! WSServer (C6): one axum WebSocket upgrade per client connection. The
//! wire shape mirrors `capswriter-client`'s `WsClient` exactly: a JSON
//! `hello` with the shared secret, then alternating Text(header)/Binary(pcm)
//! frame pairs in, JSON `RecognitionResult` text frames out.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use capswriter_protocol::{Frame, FrameHeader, Task};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::ServerState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let socket_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let handshake_ok = match ws_receiver.next().await {
        Some(Ok(Message::Text(text))) => verify_secret(&text, &state.secret),
        _ => false,
    };
    if !handshake_ok {
        tracing::warn!(socket_id = %socket_id, "websocket handshake failed, closing connection");
        let _ = ws_sender.send(Message::Close(None)).await;
        return;
    }

    state.metrics.record_ws_connect();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    state.sockets.lock().insert(socket_id.clone(), out_tx);
    tracing::info!(socket_id = %socket_id, "websocket client connected");

    let outbound = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut pending_header: Option<FrameHeader> = None;
    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<FrameHeader>(&text) {
                Ok(header) => pending_header = Some(header),
                Err(err) => tracing::warn!(%err, socket_id = %socket_id, "failed to parse frame header"),
            },
            Some(Ok(Message::Binary(payload))) => {
                let Some(header) = pending_header.take() else {
                    tracing::warn!(socket_id = %socket_id, "binary payload with no preceding header, dropping");
                    continue;
                };
                let task = Task {
                    header,
                    payload: Frame::decode_payload(&payload),
                    socket_id: socket_id.clone(),
                };
                state.queue.try_enqueue(task);
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                tracing::warn!(%err, socket_id = %socket_id, "websocket read error");
                break;
            }
        }
    }

    state.sockets.lock().remove(&socket_id);
    state.queue.close_socket(&socket_id);
    state.metrics.record_ws_disconnect();
    outbound.abort();
    tracing::info!(socket_id = %socket_id, "websocket client disconnected");
}

fn verify_secret(text: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return true;
    }
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("secret").and_then(|v| v.as_str()).map(|s| s == expected))
        .unwrap_or(false)
}
