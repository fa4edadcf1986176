//! Counter channel: server side of the `{"activeConnections": n}` push protocol.

mod handler;
mod message;

pub use handler::counter_ws_handler;
pub use message::{CounterUpdate, OutboundMessage, PayloadError};
