use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::manager::WsManager;

/// HTTP handler that upgrades the connection to WebSocket and subscribes
/// it to one job's result.
///
/// Subscribing to an unknown or already-finished job is allowed; the
/// socket simply never receives a result frame and the client falls back
/// to polling `GET /jobs/{id}`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, job_id, state.ws_manager))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the subscription with `WsManager`.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Processes inbound messages on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, job_id: String, ws_manager: Arc<WsManager>) {
    let (conn_id, mut rx) = ws_manager.subscribe(&job_id).await;
    tracing::info!(job_id = %job_id, conn_id = %conn_id, "WebSocket subscriber connected");

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_job_id = job_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(job_id = %sender_job_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: the push channel is one-way, so inbound traffic is
    // only connection housekeeping.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(job_id = %job_id, "Pong received");
            }
            Ok(_msg) => {}
            Err(e) => {
                tracing::debug!(job_id = %job_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove the subscription and abort the sender task.
    ws_manager.remove(&job_id, &conn_id).await;
    send_task.abort();
    tracing::info!(job_id = %job_id, conn_id = %conn_id, "WebSocket subscriber disconnected");
}
