use super::ConnectionArgs;
use anyhow::{Context, Result};
use clap::Args;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

#[derive(Args, Debug)]
pub struct SimulateCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Number of messages to publish
    #[arg(long, short = 'n', default_value = "10")]
    pub count: u32,

    /// Pause after each message (e.g. 2s, 500ms)
    #[arg(long, short, default_value = "2s", value_parser = humantime::parse_duration)]
    pub interval: Duration,
}

/// Payload of the `n`th simulated message, counting from 1
pub fn simulated_payload(n: u32) -> String {
    format!("Payload: Simulate {n}")
}

pub async fn execute(cmd: SimulateCommand) -> Result<()> {
    let session = cmd.connection.into_session()?;
    session
        .connect()
        .await
        .context("Failed to connect to MQTT broker")?;

    for n in 1..=cmd.count {
        if session.is_connected() {
            let payload = simulated_payload(n);
            session
                .publish(&payload)
                .await
                .context("Failed to publish simulated message")?;
            println!("→ {payload}");
        } else {
            debug!(n, "Not connected, message skipped");
        }
        sleep(cmd.interval).await;
    }

    session
        .disconnect()
        .await
        .context("Failed to disconnect cleanly")?;
    Ok(())
}
