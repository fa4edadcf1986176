use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only payload on the counter channel, server to client.
///
/// Serialized as `{"activeConnections": <n>}`. Unknown fields are tolerated
/// when parsing so the server can grow the payload without breaking clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterUpdate {
    pub active_connections: u64,
}

/// A push message that could not be read as a [`CounterUpdate`].
#[derive(Debug, Error)]
#[error("Malformed counter payload: {0}")]
pub struct PayloadError(#[from] serde_json::Error);

impl CounterUpdate {
    pub fn new(active_connections: u64) -> Self {
        Self { active_connections }
    }

    pub fn parse_text(text: &str) -> Result<Self, PayloadError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Messages queued for a single server-side connection, besides count updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Protocol-level ping used for liveness
    Ping,
    /// Close the connection with a reason
    Close { reason: String },
}

impl OutboundMessage {
    pub fn close(reason: impl Into<String>) -> Self {
        Self::Close {
            reason: reason.into(),
        }
    }
}
