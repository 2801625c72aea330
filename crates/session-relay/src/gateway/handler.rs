//! Per-socket connection handling.
//!
//! Each socket is split into a reader loop (this task) and a writer task
//! that drains the connection's outbound mailbox:
//! - Writer: serializes [`OutboundEvent`]s to JSON text frames
//! - Reader: decodes text frames to [`InboundEvent`]s and hands them to the relay
//!
//! When the socket closes the relay is told to disconnect the connection.

use super::GatewayState;
use crate::errors::RelayError;
use crate::events::{InboundEvent, OutboundEvent};
use crate::state::{ConnectionSink, DeliveryOutcome};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::types::ConnectionId;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long the writer may keep flushing after the reader has stopped.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// GET /ws
///
/// Refuses the upgrade with 503 once the relay is shutting down.
pub async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    if state.relay.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.on_upgrade(move |socket| run_connection(socket, state))
}

/// Drive one WebSocket connection until it closes.
pub async fn run_connection(socket: WebSocket, state: GatewayState) {
    let conn_id = ConnectionId::generate();
    // One extra slot for the hello frame so relayed events still get the
    // full configured capacity.
    let (sink, rx) = ConnectionSink::channel(state.connection_buffer.saturating_add(1));
    let (ws_sender, mut ws_receiver) = socket.split();

    // Hello frame goes first so the client learns its own ID before any
    // relayed event can reach it.
    let outcome = sink.deliver(OutboundEvent::Connected {
        conn_id: conn_id.clone(),
    });
    if outcome != DeliveryOutcome::Queued {
        warn!(
            target: "relay.gateway",
            conn_id = %conn_id,
            outcome = ?outcome,
            "Hello frame dropped"
        );
    }

    if let Err(e) = state.relay.connect(conn_id.clone(), sink.clone()).await {
        warn!(
            target: "relay.gateway",
            conn_id = %conn_id,
            error = %e,
            "Relay refused connection"
        );
        refuse(ws_sender, rx, &e).await;
        return;
    }

    info!(
        target: "relay.gateway",
        conn_id = %conn_id,
        "WebSocket connection started"
    );

    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx, conn_id.clone()));
    let cancel_token = state.cancel_token.child_token();

    loop {
        let frame = tokio::select! {
            () = cancel_token.cancelled() => {
                debug!(
                    target: "relay.gateway",
                    conn_id = %conn_id,
                    "Shutdown signalled, closing connection"
                );
                break;
            }
            frame = ws_receiver.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                if !handle_text_frame(&state, &conn_id, &sink, &text).await {
                    break;
                }
            }
            Some(Ok(Message::Binary(data))) => {
                debug!(
                    target: "relay.gateway",
                    conn_id = %conn_id,
                    bytes = data.len(),
                    "Binary frame ignored"
                );
            }
            // Pings are answered by the WebSocket layer.
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                debug!(
                    target: "relay.gateway",
                    conn_id = %conn_id,
                    reason = ?frame,
                    "Client initiated close"
                );
                break;
            }
            Some(Err(e)) => {
                let err = RelayError::Transport(e.to_string());
                warn!(
                    target: "relay.gateway",
                    conn_id = %conn_id,
                    error = %err,
                    "WebSocket receive error"
                );
                break;
            }
            None => break,
        }
    }

    if let Err(e) = state.relay.disconnect(conn_id.clone()).await {
        debug!(
            target: "relay.gateway",
            conn_id = %conn_id,
            error = %e,
            "Relay unavailable during disconnect"
        );
    }

    // The writer stops once every sink clone is gone: ours here, the
    // registry's when the relay processes the disconnect.
    drop(sink);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_handle)
        .await
        .is_err()
    {
        writer_handle.abort();
    }

    info!(
        target: "relay.gateway",
        conn_id = %conn_id,
        "WebSocket connection ended"
    );
}

/// Decode and forward one text frame. Returns false if the relay is gone.
async fn handle_text_frame(
    state: &GatewayState,
    conn_id: &ConnectionId,
    sink: &ConnectionSink,
    text: &str,
) -> bool {
    match serde_json::from_str::<InboundEvent>(text) {
        Ok(event) => {
            if let Err(e) = state.relay.dispatch(conn_id.clone(), event).await {
                warn!(
                    target: "relay.gateway",
                    conn_id = %conn_id,
                    error = %e,
                    "Relay unavailable, closing connection"
                );
                return false;
            }
        }
        Err(e) => {
            let err = RelayError::from(e);
            debug!(
                target: "relay.gateway",
                conn_id = %conn_id,
                error = %err,
                "Undecodable frame"
            );
            let outcome = sink.deliver(OutboundEvent::Error {
                code: err.error_code(),
                message: err.client_message(),
            });
            if outcome != DeliveryOutcome::Queued {
                debug!(
                    target: "relay.gateway",
                    conn_id = %conn_id,
                    outcome = ?outcome,
                    "Error frame dropped"
                );
            }
        }
    }
    true
}

/// Forward mailbox events to the socket as JSON text frames.
///
/// A history batch is written as one frame per archived message.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundEvent>,
    conn_id: ConnectionId,
) {
    while let Some(event) = rx.recv().await {
        for frame in event.into_frames() {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        target: "relay.gateway",
                        conn_id = %conn_id,
                        event = frame.name(),
                        error = %e,
                        "Failed to encode outbound event"
                    );
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text)).await.is_err() {
                debug!(
                    target: "relay.gateway",
                    conn_id = %conn_id,
                    "Socket closed while writing"
                );
                return;
            }
        }
    }

    let _ = ws_sender.send(Message::Close(None)).await;
}

/// Tell the client why it was refused, then close.
async fn refuse(
    mut ws_sender: SplitSink<WebSocket, Message>,
    rx: mpsc::Receiver<OutboundEvent>,
    err: &RelayError,
) {
    drop(rx);
    let frame = OutboundEvent::Error {
        code: err.error_code(),
        message: err.client_message(),
    };
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = ws_sender.send(Message::Text(text)).await;
    }
    let _ = ws_sender.send(Message::Close(None)).await;
}
