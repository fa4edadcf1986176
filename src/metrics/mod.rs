//! Prometheus metrics for the counter service.
//!
//! - Connection metrics (active, opened, closed, rejected, duration)
//! - Push metrics (count updates sent, ignored inbound messages)
//! - Heartbeat metrics (pings sent, idle connections closed)

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, HeartbeatMetrics, PushMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "live_counter";

lazy_static! {
    /// Number of open counter-channel connections
    pub static ref ACTIVE_CONNECTIONS: IntGauge = register_int_gauge!(
        format!("{}_active_connections", METRIC_PREFIX),
        "Number of open counter-channel connections"
    ).unwrap();

    /// Highest number of simultaneous connections since start
    pub static ref PEAK_CONNECTIONS: IntGauge = register_int_gauge!(
        format!("{}_peak_connections", METRIC_PREFIX),
        "Highest number of simultaneous connections since start"
    ).unwrap();

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections accepted"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    pub static ref WS_CONNECTIONS_REJECTED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_rejected_total", METRIC_PREFIX),
        "Total WebSocket connections rejected by the connection limit"
    ).unwrap();

    /// Connection lifetime in seconds
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    pub static ref COUNT_UPDATES_SENT: IntCounter = register_int_counter!(
        format!("{}_count_updates_sent_total", METRIC_PREFIX),
        "Total activeConnections payloads pushed to clients"
    ).unwrap();

    /// Client frames are not part of the protocol and are dropped
    pub static ref WS_MESSAGES_IGNORED: IntCounter = register_int_counter!(
        format!("{}_ws_messages_ignored_total", METRIC_PREFIX),
        "Total inbound client messages ignored"
    ).unwrap();

    pub static ref HEARTBEATS_SENT: IntCounter = register_int_counter!(
        format!("{}_heartbeats_sent_total", METRIC_PREFIX),
        "Total heartbeat pings queued to connections"
    ).unwrap();

    pub static ref HEARTBEAT_FAILURES: IntCounter = register_int_counter!(
        format!("{}_heartbeat_failures_total", METRIC_PREFIX),
        "Heartbeat pings that could not be queued or timed out"
    ).unwrap();

    pub static ref IDLE_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_idle_connections_closed_total", METRIC_PREFIX),
        "Connections closed for exceeding the idle timeout"
    ).unwrap();
}
