use super::ConnectionArgs;
use anyhow::{Context, Result};
use clap::Args;
use mqtt_session::SessionEvent;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct SubCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Number of messages to receive before exiting (0 = until Ctrl+C)
    #[arg(long, short = 'n', default_value = "0")]
    pub count: u32,

    /// Print topic names along with payloads
    #[arg(long)]
    pub show_topic: bool,
}

pub async fn execute(cmd: SubCommand) -> Result<()> {
    let session = cmd.connection.into_session()?;
    let mut events = session.events();

    session
        .connect()
        .await
        .context("Failed to connect to MQTT broker")?;
    println!(
        "✓ Subscribed to '{}' - waiting for messages (Ctrl+C to exit)",
        session.config().topic
    );

    let mut received = 0u32;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::MessageReceived(message)) => {
                    if cmd.show_topic {
                        println!("{}: {}", message.topic, message.payload);
                    } else {
                        println!("{}", message.payload);
                    }

                    received += 1;
                    if cmd.count > 0 && received >= cmd.count {
                        println!("✓ Received {received} messages, exiting");
                        break;
                    }
                }
                Ok(SessionEvent::Disconnected(reason)) => {
                    warn!(?reason, "Connection lost");
                    break;
                }
                Ok(SessionEvent::Connected) => info!("Connected"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Output fell behind, events dropped"),
                Err(RecvError::Closed) => break,
            },
            _ = signal::ctrl_c() => {
                println!("\n✓ Received Ctrl+C, disconnecting...");
                break;
            }
        }
    }

    session
        .disconnect()
        .await
        .context("Failed to disconnect cleanly")?;
    Ok(())
}
