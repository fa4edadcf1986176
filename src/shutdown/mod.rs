//! Graceful shutdown of the counter service.
//!
//! 1. Signal background tasks (heartbeat) to stop
//! 2. Send a close frame to every connected client
//! 3. Wait, bounded, for the registry to drain

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionManager;
use crate::websocket::OutboundMessage;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time allowed for queuing close frames to all clients
    pub client_close_timeout: Duration,
    /// Time to wait for connections to unregister
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            client_close_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&WebSocketConfig> for ShutdownConfig {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            drain_timeout: Duration::from_secs(config.shutdown_drain_timeout),
            ..Self::default()
        }
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Number of clients a close frame was queued for
    pub clients_notified: usize,
    /// Number of connections that unregistered before the drain timeout
    pub connections_closed: usize,
    /// Connections still registered when the drain timeout elapsed
    pub connections_remaining: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}

pub struct GracefulShutdown {
    connection_manager: Arc<ConnectionManager>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            connection_manager,
            shutdown_tx,
            config,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(active_connections = self.connection_manager.active_count())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();
        let initial = self.connection_manager.active_count();

        tracing::info!(reason = %reason, "Graceful shutdown: stopping background tasks");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Graceful shutdown: closing client connections");
        result.clients_notified = self.close_clients(reason).await;

        result.connections_remaining = self.wait_for_drain().await;
        result.connections_closed = initial.saturating_sub(result.connections_remaining);
        result.duration = start.elapsed();

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            connections_remaining = result.connections_remaining,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn close_clients(&self, reason: &str) -> usize {
        let connections = self.connection_manager.get_all_connections();
        if connections.is_empty() {
            return 0;
        }

        let mut pending: FuturesUnordered<_> = connections
            .into_iter()
            .map(|conn| {
                let message = OutboundMessage::close(reason);
                async move {
                    match timeout(Duration::from_secs(2), conn.send(message)).await {
                        Ok(Ok(())) => true,
                        Ok(Err(_)) | Err(_) => {
                            tracing::debug!(
                                connection_id = %conn.id,
                                "Could not queue close frame"
                            );
                            false
                        }
                    }
                }
            })
            .collect();

        let mut notified = 0;
        let collect = async {
            while let Some(queued) = pending.next().await {
                if queued {
                    notified += 1;
                }
            }
        };
        let _ = timeout(self.config.client_close_timeout, collect).await;

        notified
    }

    /// Returns the number of connections still registered
    async fn wait_for_drain(&self) -> usize {
        let mut count_rx = self.connection_manager.subscribe_count();
        let drained = timeout(self.config.drain_timeout, count_rx.wait_for(|count| *count == 0))
            .await
            .is_ok();

        let remaining = self.connection_manager.active_count();
        if !drained {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close gracefully"
            );
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let cm = Arc::new(ConnectionManager::new());
        let (tx, mut rx) = broadcast::channel(1);
        let shutdown = GracefulShutdown::new(cm, tx, ShutdownConfig::default());

        let result = shutdown.execute("test shutdown").await;

        assert_eq!(result.clients_notified, 0);
        assert_eq!(result.connections_closed, 0);
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_closes_clients() {
        let cm = Arc::new(ConnectionManager::new());
        let (conn_tx, mut conn_rx) = mpsc::channel(4);
        let handle = cm.register(None, conn_tx).unwrap();

        // Stand-in for a socket send loop that unregisters on close
        let cm_clone = cm.clone();
        tokio::spawn(async move {
            if let Some(OutboundMessage::Close { reason }) = conn_rx.recv().await {
                assert_eq!(reason, "maintenance");
                cm_clone.unregister(handle.id);
            }
        });

        let (tx, _) = broadcast::channel(1);
        let shutdown = GracefulShutdown::new(cm.clone(), tx, ShutdownConfig::default());
        let result = shutdown.execute("maintenance").await;

        assert_eq!(result.clients_notified, 1);
        assert_eq!(result.connections_closed, 1);
        assert_eq!(result.connections_remaining, 0);
    }

    #[tokio::test]
    async fn test_drain_timeout_reports_remaining() {
        let cm = Arc::new(ConnectionManager::new());
        let (conn_tx, _conn_rx) = mpsc::channel(4);
        cm.register(None, conn_tx).unwrap();

        let (tx, _) = broadcast::channel(1);
        let config = ShutdownConfig {
            client_close_timeout: Duration::from_millis(100),
            drain_timeout: Duration::from_millis(100),
        };
        let result = GracefulShutdown::new(cm, tx, config).execute("test").await;

        assert_eq!(result.connections_remaining, 1);
        assert_eq!(result.connections_closed, 0);
    }

    #[test]
    fn test_config_from_websocket_settings() {
        let ws = WebSocketConfig {
            shutdown_drain_timeout: 3,
            ..Default::default()
        };
        let config = ShutdownConfig::from(&ws);
        assert_eq!(config.drain_timeout, Duration::from_secs(3));
        assert_eq!(config.client_close_timeout, Duration::from_secs(5));
    }
}
