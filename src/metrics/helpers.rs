//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::connection_manager::ConnectionStats;
use crate::error::AppError;

use super::{
    ACTIVE_CONNECTIONS, COUNT_UPDATES_SENT, HEARTBEATS_SENT, HEARTBEAT_FAILURES,
    IDLE_CONNECTIONS_CLOSED, PEAK_CONNECTIONS, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED,
    WS_CONNECTIONS_REJECTED, WS_CONNECTION_DURATION, WS_MESSAGES_IGNORED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, AppError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| AppError::Internal(e.to_string()))
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    pub fn record_rejected() {
        WS_CONNECTIONS_REJECTED.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }

    /// Refresh gauges from a registry snapshot
    pub fn set_from_stats(stats: &ConnectionStats) {
        ACTIVE_CONNECTIONS.set(stats.active_connections as i64);
        PEAK_CONNECTIONS.set(stats.peak_connections as i64);
    }
}

/// Helper struct for recording push channel traffic
pub struct PushMetrics;

impl PushMetrics {
    pub fn record_count_sent() {
        COUNT_UPDATES_SENT.inc();
    }

    pub fn record_ignored_inbound() {
        WS_MESSAGES_IGNORED.inc();
    }
}

/// Helper struct for recording heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_round(sent: u64, failed: u64) {
        HEARTBEATS_SENT.inc_by(sent);
        HEARTBEAT_FAILURES.inc_by(failed);
    }

    pub fn record_idle_closed(count: u64) {
        IDLE_CONNECTIONS_CLOSED.inc_by(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_output_contains_metrics() {
        ConnectionMetrics::record_opened();
        PushMetrics::record_count_sent();
        let output = encode_metrics().unwrap();
        assert!(output.contains("live_counter_ws_connections_opened_total"));
        assert!(output.contains("live_counter_count_updates_sent_total"));
    }

    #[test]
    fn test_gauges_follow_stats() {
        ConnectionMetrics::set_from_stats(&ConnectionStats {
            active_connections: 4,
            peak_connections: 9,
            total_opened: 12,
            total_closed: 8,
            max_connections: 100,
        });
        assert_eq!(ACTIVE_CONNECTIONS.get(), 4);
        assert_eq!(PEAK_CONNECTIONS.get(), 9);
    }
}
