//! Per-connection session loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use sockettalk_common::Envelope;
use tracing::{debug, info};
use uuid::Uuid;

use crate::BrokerState;

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(socket: WebSocket, state: Arc<BrokerState>) {
    let (mut sender, mut receiver) = socket.split();
    let (session_id, mut outbound) = state.hub.register().await;
    info!(session = %session_id, "Session connected");

    // ── Sender task ──────────────────────────────────────────────────────────
    // Drains this session's hub queue onto the single WebSocket sender.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // ── Receive loop ─────────────────────────────────────────────────────────
    while let Some(msg) = receiver.next().await {
        let frame = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    debug!(session = %session_id, "Dropping non UTF-8 frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        accept(&state, session_id, frame).await;
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    state.hub.remove(session_id).await;
    send_task.abort();
    info!(session = %session_id, "Session disconnected");
}

/// Run the auth gate on an inbound frame, then fan it out and forward it upstream.
pub(crate) async fn accept(state: &BrokerState, from: Uuid, raw: String) {
    let frame = match &state.auth {
        None => raw.clone(),
        Some(gate) => match gate(raw.as_bytes()).map(String::from_utf8) {
            Some(Ok(stripped)) => stripped,
            Some(Err(_)) => {
                debug!(session = %from, "Gate produced a non UTF-8 frame, dropped");
                return;
            }
            None => {
                debug!(session = %from, "Auth gate rejected frame");
                state.hub.send_to(from, Envelope::auth_failed().to_json()).await;
                return;
            }
        },
    };

    let delivered = state.hub.broadcast(&frame, Some(from)).await;
    debug!(session = %from, delivered, "Frame broadcast");

    // The upstream runs its own gate, so it gets the frame as the client signed it.
    if let Some(link) = &state.link {
        link.forward(raw);
    }
}
