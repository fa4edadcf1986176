use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionManager;
use crate::metrics::HeartbeatMetrics;
use crate::websocket::OutboundMessage;

/// Timeout for individual heartbeat send operations
const HEARTBEAT_SEND_TIMEOUT_MS: u64 = 5000;

/// Maximum concurrent heartbeat sends to avoid overwhelming the system
const MAX_CONCURRENT_HEARTBEATS: usize = 1000;

/// Background task that pings clients and closes idle ones
pub struct HeartbeatTask {
    config: WebSocketConfig,
    connection_manager: Arc<ConnectionManager>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        connection_manager: Arc<ConnectionManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            connection_manager,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup loops until shutdown
    pub async fn run(mut self) {
        let mut heartbeat_timer =
            tokio::time::interval(Duration::from_secs(self.config.heartbeat_interval));
        let mut cleanup_timer =
            tokio::time::interval(Duration::from_secs(self.config.cleanup_interval));

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = self.config.connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats().await;
                }
                _ = cleanup_timer.tick() => {
                    self.close_idle_connections().await;
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a ping to every connection, in batches
    async fn send_heartbeats(&self) {
        let connections = self.connection_manager.get_all_connections();
        if connections.is_empty() {
            return;
        }

        let start = Instant::now();
        let send_timeout = Duration::from_millis(HEARTBEAT_SEND_TIMEOUT_MS);
        let mut sent = 0u64;
        let mut failed = 0u64;

        for batch in connections.chunks(MAX_CONCURRENT_HEARTBEATS) {
            let results = join_all(batch.iter().map(|handle| async move {
                match timeout(send_timeout, handle.send(OutboundMessage::Ping)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(_)) => {
                        tracing::debug!(
                            connection_id = %handle.id,
                            "Failed to queue heartbeat, connection may be dead"
                        );
                        false
                    }
                    Err(_) => {
                        tracing::debug!(
                            connection_id = %handle.id,
                            timeout_ms = HEARTBEAT_SEND_TIMEOUT_MS,
                            "Heartbeat send timed out"
                        );
                        false
                    }
                }
            }))
            .await;

            for ok in results {
                if ok {
                    sent += 1;
                } else {
                    failed += 1;
                }
            }
        }

        HeartbeatMetrics::record_round(sent, failed);

        tracing::debug!(
            total = connections.len(),
            sent = sent,
            failed = failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Heartbeat round completed"
        );
    }

    /// Ask connections idle past the timeout to close
    async fn close_idle_connections(&self) {
        let stale = self
            .connection_manager
            .get_stale_connections(self.config.connection_timeout);
        if stale.is_empty() {
            return;
        }

        let mut closed = 0u64;
        for handle in &stale {
            let close = OutboundMessage::close("idle timeout");
            match handle.sender.try_send(close) {
                Ok(()) => closed += 1,
                Err(TrySendError::Full(_)) => {
                    // Send loop is stuck on a slow socket; the handler unregisters
                    // after tearing it down
                    tracing::debug!(connection_id = %handle.id, "Control queue full, terminating");
                    handle.terminate();
                    closed += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    // Send loop is gone; drop the registration directly
                    if self.connection_manager.unregister(handle.id) {
                        closed += 1;
                    }
                }
            }
        }

        HeartbeatMetrics::record_idle_closed(closed);

        tracing::info!(
            closed = closed,
            timeout_secs = self.config.connection_timeout,
            "Closed idle connections"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let config = WebSocketConfig::default();
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(config, connection_manager, shutdown_rx);
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_pings_connections() {
        let config = WebSocketConfig {
            heartbeat_interval: 1,
            connection_timeout: 60,
            cleanup_interval: 60,
            ..Default::default()
        };
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(10);
        let _handle = connection_manager.register(None, tx).unwrap();

        let task = HeartbeatTask::new(config, connection_manager, shutdown_rx);
        let task_handle = tokio::spawn(task.run());

        let msg = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive heartbeat")
            .expect("Channel should not be closed");
        assert_eq!(msg, OutboundMessage::Ping);

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[tokio::test]
    async fn test_idle_connections_are_asked_to_close() {
        let config = WebSocketConfig {
            connection_timeout: 60,
            ..Default::default()
        };
        let connection_manager = Arc::new(ConnectionManager::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(10);
        let idle = connection_manager.register(None, tx).unwrap();
        idle.set_last_activity(chrono::Utc::now().timestamp() - 300);

        let task = HeartbeatTask::new(config, connection_manager.clone(), shutdown_rx);
        task.close_idle_connections().await;

        assert_eq!(rx.recv().await, Some(OutboundMessage::close("idle timeout")));
    }

    #[tokio::test]
    async fn test_idle_connection_without_send_loop_is_unregistered() {
        let connection_manager = Arc::new(ConnectionManager::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, rx) = mpsc::channel::<OutboundMessage>(1);
        drop(rx);
        let idle = connection_manager.register(None, tx).unwrap();
        idle.set_last_activity(chrono::Utc::now().timestamp() - 300);

        let task = HeartbeatTask::new(WebSocketConfig::default(), connection_manager.clone(), shutdown_rx);
        task.close_idle_connections().await;

        assert_eq!(connection_manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_connection_with_full_queue_is_terminated_not_unregistered() {
        let connection_manager = Arc::new(ConnectionManager::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(1);
        let idle = connection_manager.register(None, tx).unwrap();
        idle.sender.try_send(OutboundMessage::Ping).unwrap();
        idle.set_last_activity(chrono::Utc::now().timestamp() - 300);

        let task = HeartbeatTask::new(WebSocketConfig::default(), connection_manager.clone(), shutdown_rx);
        task.close_idle_connections().await;

        // Still counted until its socket is actually torn down
        assert_eq!(connection_manager.active_count(), 1);
        tokio::time::timeout(Duration::from_secs(1), idle.terminated())
            .await
            .expect("connection should be told to terminate");

        assert_eq!(rx.recv().await, Some(OutboundMessage::Ping));
        assert!(rx.try_recv().is_err());
    }
}
