//! Live connection indicator: a push-channel client that shows how many
//! clients the counter service currently reports as connected.
//!
//! Activation opens exactly one channel to the configured endpoint. Every
//! valid `{"activeConnections": n}` message replaces the displayed count.
//! Channel failures are logged and end the session without a reconnect; the
//! last known count stays visible. Deactivation (or dropping the indicator)
//! closes the channel and discards the count, and is safe to repeat.

mod channel;
mod endpoint;
mod machine;
mod render;

pub use channel::{Connector, Frame, PushChannel, WebSocketChannel, WebSocketConnector};
pub use endpoint::Endpoint;
pub use machine::{
    ChannelState, ConnectionCountState, FrameOutcome, IndicatorMachine, IndicatorSnapshot,
};
pub use render::{render_line, Pulse};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::IndicatorConfig;
use crate::error::{ChannelError, IndicatorError};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct Session {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns one push channel at a time and publishes its state.
///
/// Must be activated from within a tokio runtime.
pub struct LiveConnectionIndicator<C: Connector> {
    connector: Arc<C>,
    endpoint: Endpoint,
    connect_timeout: Duration,
    machine: Arc<watch::Sender<IndicatorMachine>>,
    session: Option<Session>,
}

impl<C: Connector> LiveConnectionIndicator<C> {
    pub fn new(connector: C, endpoint: Endpoint) -> Self {
        let (machine, _) = watch::channel(IndicatorMachine::new());
        Self {
            connector: Arc::new(connector),
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            machine: Arc::new(machine),
            session: None,
        }
    }

    pub fn from_config(connector: C, config: &IndicatorConfig) -> Result<Self, ChannelError> {
        let endpoint = Endpoint::parse(&config.endpoint)?;
        Ok(Self::new(connector, endpoint)
            .with_connect_timeout(Duration::from_secs(config.connect_timeout)))
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ChannelState {
        self.machine.borrow().state()
    }

    pub fn snapshot(&self) -> IndicatorSnapshot {
        self.machine.borrow().snapshot()
    }

    /// Observe every state change, e.g. to re-render.
    pub fn subscribe(&self) -> watch::Receiver<IndicatorMachine> {
        self.machine.subscribe()
    }

    /// Open the channel to the configured endpoint.
    pub fn activate(&mut self) -> Result<(), IndicatorError> {
        let mut result = Ok(());
        self.machine.send_if_modified(|machine| match machine.activate() {
            Ok(()) => true,
            Err(e) => {
                result = Err(e);
                false
            }
        });
        result?;

        // A previous session that ended on its own has nothing left to cancel
        self.session.take();

        let (cancel, cancelled) = oneshot::channel();
        let task = tokio::spawn(run_session(
            self.connector.clone(),
            self.endpoint.clone(),
            self.connect_timeout,
            self.machine.clone(),
            cancelled,
        ));
        self.session = Some(Session { cancel, task });

        tracing::info!(endpoint = %self.endpoint, "Live connection indicator activated");
        Ok(())
    }

    /// Close the channel if one is open. Repeated calls are no-ops.
    pub async fn deactivate(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.cancel.send(());
            if let Err(e) = session.task.await {
                tracing::warn!(error = %e, "Indicator session task ended abnormally");
            }
        }

        let mut was_active = false;
        self.machine.send_if_modified(|machine| {
            let had_count = machine.active_connections() != 0;
            was_active = machine.deactivate();
            was_active || had_count
        });
        if was_active {
            tracing::info!(endpoint = %self.endpoint, "Live connection indicator deactivated");
        }
    }
}

impl<C: Connector> Drop for LiveConnectionIndicator<C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            // The session task closes its channel when it sees the signal
            let _ = session.cancel.send(());
        }
    }
}

async fn run_session<C: Connector>(
    connector: Arc<C>,
    endpoint: Endpoint,
    connect_timeout: Duration,
    machine: Arc<watch::Sender<IndicatorMachine>>,
    mut cancelled: oneshot::Receiver<()>,
) {
    let connect = tokio::time::timeout(connect_timeout, connector.connect(&endpoint));

    let mut channel = tokio::select! {
        biased;
        _ = &mut cancelled => {
            tracing::debug!(endpoint = %endpoint, "Activation cancelled before the channel opened");
            return;
        }
        result = connect => match result {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                report_failure(&machine, &endpoint, e);
                return;
            }
            Err(_) => {
                let e = ChannelError::ConnectTimeout {
                    endpoint: endpoint.to_string(),
                    timeout_ms: u64::try_from(connect_timeout.as_millis()).unwrap_or(u64::MAX),
                };
                report_failure(&machine, &endpoint, e);
                return;
            }
        }
    };

    machine.send_if_modified(IndicatorMachine::on_open);
    tracing::info!(endpoint = %endpoint, "Push channel connected");

    loop {
        tokio::select! {
            biased;
            _ = &mut cancelled => break,
            frame = channel.next_frame() => match frame {
                Some(Ok(frame)) => apply_frame(&machine, &frame),
                Some(Err(e)) => {
                    report_failure(&machine, &endpoint, e);
                    break;
                }
                None => {
                    machine.send_modify(IndicatorMachine::on_close);
                    tracing::info!(endpoint = %endpoint, "Push channel closed by server");
                    break;
                }
            }
        }
    }

    if let Err(e) = channel.close().await {
        tracing::debug!(endpoint = %endpoint, error = %e, "Error while closing push channel");
    }
}

fn apply_frame(machine: &watch::Sender<IndicatorMachine>, frame: &Frame) {
    let mut outcome = None;
    machine.send_if_modified(|m| {
        let result = m.on_frame(frame);
        let changed = !matches!(result, FrameOutcome::Dropped);
        outcome = Some(result);
        changed
    });

    match outcome {
        Some(FrameOutcome::Applied(count)) => {
            tracing::debug!(active_connections = count, "Connection count updated");
        }
        Some(FrameOutcome::Rejected(e)) => {
            tracing::warn!(error = %e, "Ignoring malformed counter payload");
        }
        Some(FrameOutcome::Dropped) | None => {
            tracing::debug!("Dropped frame received outside an open session");
        }
    }
}

fn report_failure(machine: &watch::Sender<IndicatorMachine>, endpoint: &Endpoint, error: ChannelError) {
    tracing::error!(
        endpoint = %endpoint,
        error = %error,
        "Push channel failed, keeping last known count"
    );
    machine.send_modify(|m| m.on_error(error));
}
