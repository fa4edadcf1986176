use super::{ChannelState, IndicatorSnapshot};

/// Phase of the pulsing dot. Only a connected indicator pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pulse {
    #[default]
    On,
    Off,
}

impl Pulse {
    pub fn toggle(self) -> Self {
        match self {
            Pulse::On => Pulse::Off,
            Pulse::Off => Pulse::On,
        }
    }
}

/// Render the indicator as a single terminal line, e.g. `● 3 active`.
pub fn render_line(snapshot: &IndicatorSnapshot, pulse: Pulse) -> String {
    let dot = match (snapshot.state, pulse) {
        (ChannelState::Connected, Pulse::On) => '●',
        (ChannelState::Connected, Pulse::Off) => '○',
        (ChannelState::Connecting, _) => '◌',
        (ChannelState::Disconnected, _) => '○',
    };
    format!("{} {} active", dot, snapshot.active_connections)
}
