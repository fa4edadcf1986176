//! Registry of open counter-channel connections.

mod registry;
mod stats;
mod types;

pub use registry::ConnectionManager;
pub use stats::ConnectionStats;
pub use types::{ConnectionError, ConnectionHandle, ConnectionLimits};
