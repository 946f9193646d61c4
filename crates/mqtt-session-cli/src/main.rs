use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mqtt-session")]
#[command(about = "Single-topic MQTT 3.1.1 session: publish, subscribe and simulate")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish one message and exit
    Pub(commands::pub_cmd::PubCommand),
    /// Print messages received on the configured topic until Ctrl+C
    Sub(commands::sub_cmd::SubCommand),
    /// Publish a numbered series of test messages to the configured topic
    Simulate(commands::simulate_cmd::SimulateCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Process-wide provider for anything that does not pick one explicitly
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Pub(cmd) => commands::pub_cmd::execute(cmd).await,
        Commands::Sub(cmd) => commands::sub_cmd::execute(cmd).await,
        Commands::Simulate(cmd) => commands::simulate_cmd::execute(cmd).await,
    }
}
