use std::collections::HashMap;

use airlock_core::types::Timestamp;
use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// A single job-result subscription.
pub struct WsConnection {
    /// Socket-instance id, so a superseded subscriber's cleanup cannot
    /// evict its replacement.
    pub conn_id: String,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this subscription was established.
    pub connected_at: Timestamp,
}

/// Registry of WebSocket subscribers, keyed by job id.
///
/// A job has at most one subscriber: a later subscription for the same
/// job replaces the earlier one. The registry is advisory only -- jobs
/// run and finish whether or not anyone is listening, and the job row
/// remains the durable record of the result.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    subscribers: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe a connection to a job's result.
    ///
    /// Returns the socket-instance id and the receiver half of the
    /// message channel so the caller can forward messages to the
    /// WebSocket sink. Any earlier subscriber for the same job is
    /// replaced (its channel closes, ending its forwarding task).
    pub async fn subscribe(&self, job_id: &str) -> (String, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = uuid::Uuid::new_v4().to_string();
        let conn = WsConnection {
            conn_id: conn_id.clone(),
            sender: tx,
            connected_at: chrono::Utc::now(),
        };

        if let Some(replaced) = self
            .subscribers
            .write()
            .await
            .insert(job_id.to_string(), conn)
        {
            tracing::debug!(
                job_id,
                replaced_conn_id = %replaced.conn_id,
                "Replaced earlier subscriber for job",
            );
        }
        (conn_id, rx)
    }

    /// Remove a subscription, but only if it still belongs to the given
    /// socket instance. A disconnecting subscriber that has already been
    /// replaced must not tear down its replacement.
    pub async fn remove(&self, job_id: &str, conn_id: &str) {
        let mut subs = self.subscribers.write().await;
        if subs.get(job_id).is_some_and(|c| c.conn_id == conn_id) {
            subs.remove(job_id);
        }
    }

    /// Push a message to the job's subscriber, if one is connected.
    ///
    /// Returns whether the message was handed to a live channel. `false`
    /// means nobody was listening; callers log and move on, since the
    /// job row is the recovery path.
    pub async fn send_to_job(&self, job_id: &str, message: Message) -> bool {
        let subs = self.subscribers.read().await;
        match subs.get(job_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Return the current number of active subscriptions.
    pub async fn connection_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let subs = self.subscribers.read().await;
        for conn in subs.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut subs = self.subscribers.write().await;
        let count = subs.len();
        for conn in subs.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        subs.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
