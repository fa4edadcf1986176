use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::connection_manager::ConnectionHandle;
use crate::metrics::{ConnectionMetrics, PushMetrics};
use crate::server::AppState;

use super::message::{CounterUpdate, OutboundMessage};

const CHANNEL_BUFFER_SIZE: usize = 16;

/// WebSocket upgrade handler for the counter channel
#[tracing::instrument(name = "ws.upgrade", skip(ws, state, headers))]
pub async fn counter_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_agent))
}

/// Handle an established counter-channel connection
#[tracing::instrument(name = "ws.connection", skip(socket, state), fields(otel.kind = "server"))]
async fn handle_socket(socket: WebSocket, state: AppState, user_agent: Option<String>) {
    let connection_start = std::time::Instant::now();

    // Create channel for control messages to this connection
    let (tx, rx) = mpsc::channel::<OutboundMessage>(CHANNEL_BUFFER_SIZE);

    // Subscribe before registering so our own arrival is observed
    let count_rx = state.connection_manager.subscribe_count();

    let handle = match state.connection_manager.register(user_agent, tx) {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!(error = %e, "Connection rejected");
            ConnectionMetrics::record_rejected();
            let (mut ws_sender, _) = socket.split();
            let _ = ws_sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };
    let connection_id = handle.id;
    ConnectionMetrics::record_opened();

    tracing::info!(connection_id = %connection_id, "Counter channel established");

    let (ws_sender, mut ws_receiver) = socket.split();

    let mut send_task = tokio::spawn(push_counts(ws_sender, count_rx, rx));

    let handle_clone = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &handle_clone) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, then stop the other
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
        _ = handle.terminated() => {
            tracing::info!(connection_id = %connection_id, "Connection terminated");
            send_task.abort();
            recv_task.abort();
        }
    }

    state.connection_manager.unregister(connection_id);

    let duration = connection_start.elapsed().as_secs_f64();
    ConnectionMetrics::record_closed(duration);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = duration,
        "Counter channel closed"
    );
}

/// Push the current count, then every change, until the connection ends.
async fn push_counts(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut count_rx: watch::Receiver<usize>,
    mut control_rx: mpsc::Receiver<OutboundMessage>,
) {
    let initial = *count_rx.borrow_and_update();
    if send_count(&mut ws_sender, initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            changed = count_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = *count_rx.borrow_and_update();
                if send_count(&mut ws_sender, count).await.is_err() {
                    break;
                }
            }
            control = control_rx.recv() => match control {
                Some(OutboundMessage::Ping) => {
                    if ws_sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                Some(OutboundMessage::Close { reason }) => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
                None => break,
            }
        }
    }
}

async fn send_count(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    count: usize,
) -> Result<(), axum::Error> {
    let payload = match CounterUpdate::new(count as u64).to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize counter update");
            return Ok(());
        }
    };

    ws_sender.send(Message::Text(payload.into())).await?;
    PushMetrics::record_count_sent();
    Ok(())
}

/// Process a received WebSocket message.
/// Returns false if the connection should be closed
fn process_message(msg: Message, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(_) | Message::Binary(_) => {
            // The channel is push-only; client payloads carry no meaning
            handle.update_activity();
            PushMetrics::record_ignored_inbound();
            tracing::debug!(connection_id = %handle.id, "Ignoring inbound client message");
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Client initiated close");
            false
        }
    }
}
