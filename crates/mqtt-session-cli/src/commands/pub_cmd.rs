use super::ConnectionArgs;
use anyhow::{bail, Context, Result};
use clap::Args;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct PubCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Message payload
    #[arg(long, short)]
    pub message: String,

    /// Publish to this topic instead of the configured one
    #[arg(long)]
    pub to: Option<String>,
}

/// Decides whether a publish can be reported as done
///
/// The link must still be up and every `QoS` 1/2 handshake finished.
fn publish_status(connected: bool, unacknowledged: usize) -> Result<()> {
    if !connected {
        bail!("Connection lost; the message may not have been delivered");
    }
    if unacknowledged > 0 {
        bail!("Broker did not acknowledge the message in time");
    }
    Ok(())
}

pub async fn execute(cmd: PubCommand) -> Result<()> {
    let session = cmd.connection.into_session()?;
    let topic = cmd.to.unwrap_or_else(|| session.config().topic.clone());

    info!(server = %session.config().server, "Connecting...");
    session
        .connect()
        .await
        .context("Failed to connect to MQTT broker")?;

    // A publish on a dropped link is skipped without an error
    if !session.is_connected() {
        bail!("Connection lost before the message could be published");
    }

    session
        .publish_to(&topic, &cmd.message)
        .await
        .context("Failed to publish message")?;

    // Let the QoS handshake finish before closing the link
    let deadline = Instant::now() + session.config().operation_timeout;
    while session.inflight_count().await > 0 {
        if Instant::now() >= deadline {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    let status = publish_status(session.is_connected(), session.inflight_count().await);
    if let Err(e) = &status {
        warn!(error = %e, "Publish not confirmed");
        let _ = session.disconnect().await;
    }
    status?;

    println!("✓ Published message to '{topic}'");

    session
        .disconnect()
        .await
        .context("Failed to disconnect cleanly")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_status() {
        assert!(publish_status(true, 0).is_ok());

        let lost = publish_status(false, 0).unwrap_err();
        assert!(lost.to_string().contains("Connection lost"));

        let pending = publish_status(true, 1).unwrap_err();
        assert!(pending.to_string().contains("acknowledge"));

        assert!(publish_status(false, 1).is_err());
    }
}
