//! Connection statistics

use serde::Serialize;

/// Counter-service connection statistics
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConnectionStats {
    pub active_connections: usize,
    pub peak_connections: usize,
    pub total_opened: u64,
    pub total_closed: u64,
    pub max_connections: usize,
}
