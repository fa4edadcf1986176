//! Connection handle and related types

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::websocket::OutboundMessage;

/// Handle for a single counter-channel connection
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_agent: Option<String>,
    pub sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
    /// Last activity timestamp (Unix seconds) - using AtomicI64 for lock-free updates
    last_activity: AtomicI64,
    /// Forced teardown when the send loop cannot take a close frame
    terminate: Notify,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("user_agent", &self.user_agent)
            .field("connected_at", &self.connected_at)
            .field("idle_seconds", &self.idle_seconds())
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub fn new(user_agent: Option<String>, sender: mpsc::Sender<OutboundMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_agent,
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            terminate: Notify::new(),
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    /// Seconds since the last inbound frame (or since connect)
    pub fn idle_seconds(&self) -> i64 {
        Utc::now().timestamp() - self.last_activity.load(Ordering::Relaxed)
    }

    pub async fn send(
        &self,
        message: OutboundMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(message).await
    }

    /// Ask the socket tasks of this connection to stop without a close frame.
    /// The handler unregisters the connection once the socket is torn down.
    pub fn terminate(&self) {
        // notify_one keeps a permit if the handler is not waiting yet
        self.terminate.notify_one();
    }

    /// Resolves once [`terminate`](Self::terminate) has been called
    pub async fn terminated(&self) {
        self.terminate.notified().await;
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&self, timestamp: i64) {
        self.last_activity.store(timestamp, Ordering::Relaxed);
    }
}

/// Error returned when connection limits are exceeded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection limit exceeded ({current}/{max})")]
    LimitExceeded { current: usize, max: usize },
}

/// Limits for connection management
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_connections: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_connections: 10000,
        }
    }
}
