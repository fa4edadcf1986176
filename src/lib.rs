//! Live connection counter.
//!
//! A WebSocket counter service that pushes `{"activeConnections": n}` to its
//! clients, and the live connection indicator that consumes that channel.

// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Counter service
pub mod api;
pub mod connection_manager;
pub mod server;
pub mod shutdown;
pub mod tasks;
pub mod websocket;

// Push-channel client
pub mod indicator;
