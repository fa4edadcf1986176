use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::websocket::OutboundMessage;

use super::stats::ConnectionStats;
use super::types::{ConnectionError, ConnectionHandle, ConnectionLimits};

/// Tracks every open counter-channel connection and publishes the live count.
///
/// Registry mutations happen while the count channel is locked, so the
/// published value always matches the registry and limit checks cannot race.
pub struct ConnectionManager {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    count_tx: watch::Sender<usize>,
    limits: ConnectionLimits,
    peak_connections: AtomicUsize,
    total_opened: AtomicU64,
    total_closed: AtomicU64,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_limits(ConnectionLimits::default())
    }

    pub fn with_limits(limits: ConnectionLimits) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            connections: DashMap::new(),
            count_tx,
            limits,
            peak_connections: AtomicUsize::new(0),
            total_opened: AtomicU64::new(0),
            total_closed: AtomicU64::new(0),
        }
    }

    /// Register a new connection, enforcing the connection limit
    pub fn register(
        &self,
        user_agent: Option<String>,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Result<Arc<ConnectionHandle>, ConnectionError> {
        let handle = Arc::new(ConnectionHandle::new(user_agent, sender));
        let mut outcome = Ok(0);

        self.count_tx.send_if_modified(|count| {
            let current = self.connections.len();
            if current >= self.limits.max_connections {
                outcome = Err(ConnectionError::LimitExceeded {
                    current,
                    max: self.limits.max_connections,
                });
                return false;
            }
            self.connections.insert(handle.id, handle.clone());
            *count = self.connections.len();
            outcome = Ok(*count);
            true
        });

        let active = outcome?;
        self.total_opened.fetch_add(1, Ordering::Relaxed);
        self.peak_connections.fetch_max(active, Ordering::Relaxed);

        tracing::info!(
            connection_id = %handle.id,
            user_agent = ?handle.user_agent,
            active_connections = active,
            "Connection registered"
        );

        Ok(handle)
    }

    /// Unregister a connection. Returns false if it was already gone.
    pub fn unregister(&self, connection_id: Uuid) -> bool {
        let mut removed = None;

        self.count_tx.send_if_modified(|count| {
            removed = self.connections.remove(&connection_id);
            if removed.is_none() {
                return false;
            }
            *count = self.connections.len();
            true
        });

        match removed {
            Some((_, handle)) => {
                self.total_closed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    connection_id = %connection_id,
                    connected_secs = (chrono::Utc::now() - handle.connected_at).num_seconds(),
                    active_connections = self.active_count(),
                    "Connection unregistered"
                );
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        *self.count_tx.borrow()
    }

    /// Receiver that observes every change of the active connection count
    pub fn subscribe_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    pub fn get(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections
            .get(&connection_id)
            .map(|entry| entry.value().clone())
    }

    pub fn get_all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Connections with no inbound activity for longer than `timeout_secs`
    pub fn get_stale_connections(&self, timeout_secs: u64) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().idle_seconds() > timeout_secs as i64)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            active_connections: self.active_count(),
            peak_connections: self.peak_connections.load(Ordering::Relaxed),
            total_opened: self.total_opened.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
            max_connections: self.limits.max_connections,
        }
    }
}
