//! Terminal rendition of the live connection indicator.
//!
//! Connects to the configured counter endpoint and redraws `● <n> active`
//! in place until Ctrl+C.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;

use live_counter::config::Settings;
use live_counter::indicator::{render_line, LiveConnectionIndicator, Pulse, WebSocketConnector};
use live_counter::telemetry::init_telemetry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    let _telemetry = init_telemetry(&settings.otel)?;

    let mut indicator =
        LiveConnectionIndicator::from_config(WebSocketConnector, &settings.indicator)?;
    let mut updates = indicator.subscribe();
    indicator.activate()?;

    let mut pulse = Pulse::default();
    let mut ticker =
        tokio::time::interval(Duration::from_millis(settings.indicator.pulse_interval_ms));
    let mut stdout = std::io::stdout();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let line = render_line(&indicator.snapshot(), pulse);
        write!(stdout, "\r\x1b[2K{}", line)?;
        stdout.flush()?;

        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => pulse = pulse.toggle(),
        }
    }

    indicator.deactivate().await;
    writeln!(stdout)?;
    Ok(())
}
