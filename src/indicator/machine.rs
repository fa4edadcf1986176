//! Lifecycle state machine of a live connection indicator.
//!
//! The machine is pure: it never touches a socket. The async driver in
//! [`super::LiveConnectionIndicator`] feeds it transport events and publishes
//! it to observers through a `watch` channel.

use std::fmt;

use serde::Serialize;

use crate::error::{ChannelError, IndicatorError};
use crate::websocket::{CounterUpdate, PayloadError};

use super::channel::Frame;

/// Channel lifecycle. `Disconnected` is both the initial and the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

impl ChannelState {
    pub fn is_active(self) -> bool {
        !matches!(self, ChannelState::Disconnected)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Number of clients the server last reported as connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionCountState {
    pub active_connections: u64,
}

impl ConnectionCountState {
    /// Replace the count. Updates are never accumulated.
    pub fn replace(&mut self, update: CounterUpdate) {
        self.active_connections = update.active_connections;
    }
}

/// What happened to one inbound frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// The count was replaced with this value
    Applied(u64),
    /// The payload was malformed; prior state kept
    Rejected(PayloadError),
    /// A frame arrived while not connected and was dropped
    Dropped,
}

/// Point-in-time copy of the indicator, for rendering and assertions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndicatorSnapshot {
    pub state: ChannelState,
    pub active_connections: u64,
    pub last_error: Option<String>,
    pub applied_updates: u64,
    pub rejected_payloads: u64,
}

#[derive(Debug, Clone)]
pub struct IndicatorMachine {
    state: ChannelState,
    count: ConnectionCountState,
    last_error: Option<ChannelError>,
    applied_updates: u64,
    rejected_payloads: u64,
}

impl Default for IndicatorMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorMachine {
    pub fn new() -> Self {
        Self {
            state: ChannelState::Disconnected,
            count: ConnectionCountState::default(),
            last_error: None,
            applied_updates: 0,
            rejected_payloads: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn active_connections(&self) -> u64 {
        self.count.active_connections
    }

    pub fn last_error(&self) -> Option<&ChannelError> {
        self.last_error.as_ref()
    }

    /// `Disconnected -> Connecting`. A fresh activation starts counting from zero.
    pub fn activate(&mut self) -> Result<(), IndicatorError> {
        if self.state.is_active() {
            return Err(IndicatorError::AlreadyActive);
        }
        self.state = ChannelState::Connecting;
        self.count = ConnectionCountState::default();
        self.last_error = None;
        self.applied_updates = 0;
        self.rejected_payloads = 0;
        Ok(())
    }

    /// `Connecting -> Connected`. Returns false if the handshake result is stale.
    pub fn on_open(&mut self) -> bool {
        if self.state != ChannelState::Connecting {
            return false;
        }
        self.state = ChannelState::Connected;
        true
    }

    pub fn on_frame(&mut self, frame: &Frame) -> FrameOutcome {
        if self.state != ChannelState::Connected {
            return FrameOutcome::Dropped;
        }

        let parsed = match frame {
            Frame::Text(text) => CounterUpdate::parse_text(text),
            Frame::Binary(bytes) => CounterUpdate::parse_bytes(bytes),
        };

        match parsed {
            Ok(update) => {
                self.count.replace(update);
                self.applied_updates += 1;
                FrameOutcome::Applied(update.active_connections)
            }
            Err(e) => {
                self.rejected_payloads += 1;
                FrameOutcome::Rejected(e)
            }
        }
    }

    /// Any channel failure is terminal for the session. The count is kept.
    pub fn on_error(&mut self, error: ChannelError) {
        self.state = ChannelState::Disconnected;
        self.last_error = Some(error);
    }

    /// The server closed the channel. The count is kept.
    pub fn on_close(&mut self) {
        self.state = ChannelState::Disconnected;
    }

    /// Ends the session and discards the count. Returns whether a session
    /// was still active.
    pub fn deactivate(&mut self) -> bool {
        let was_active = self.state.is_active();
        self.state = ChannelState::Disconnected;
        self.count = ConnectionCountState::default();
        was_active
    }

    pub fn snapshot(&self) -> IndicatorSnapshot {
        IndicatorSnapshot {
            state: self.state,
            active_connections: self.count.active_connections,
            last_error: self.last_error.as_ref().map(ToString::to_string),
            applied_updates: self.applied_updates,
            rejected_payloads: self.rejected_payloads,
        }
    }
}
