pub mod pub_cmd;
pub mod simulate_cmd;
pub mod sub_cmd;

use anyhow::{Context, Result};
use clap::Args;
use dialoguer::{Input, Password};
use mqtt_session::{Session, SessionConfig};
use std::path::PathBuf;
use tracing::debug;

/// Connection settings shared by every command
///
/// Values from `--config` are loaded first; flags given on the command line
/// override them.
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// TOML or JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long, short = 'H')]
    pub host: Option<String>,

    /// MQTT broker port
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Topic to subscribe and publish to
    #[arg(long, short)]
    pub topic: Option<String>,

    /// Username for authentication
    #[arg(long, short)]
    pub username: Option<String>,

    /// Password for authentication
    #[arg(long, short = 'P')]
    pub password: Option<String>,

    /// Client ID (generated when omitted)
    #[arg(long, short)]
    pub client_id: Option<String>,

    /// Connect over TLS
    #[arg(long)]
    pub tls: bool,

    /// CA certificate file (PEM) to trust in addition to the bundled roots
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Skip certificate verification for TLS connections (insecure, for testing only)
    #[arg(long)]
    pub insecure: bool,

    /// Fail instead of prompting for missing values
    #[arg(long)]
    pub non_interactive: bool,
}

impl ConnectionArgs {
    /// Merges the configuration file, flags and prompts into a session config
    pub fn build_config(self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(host) = self.host {
            config.server = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(topic) = self.topic {
            config.topic = topic;
        }
        if let Some(username) = self.username {
            config.username = username;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if self.client_id.is_some() {
            config.client_id = self.client_id;
        }
        if self.tls {
            config.use_tls = true;
        }
        if self.ca_cert.is_some() {
            config.tls.ca_cert = self.ca_cert;
        }
        if self.insecure {
            config.tls.insecure_skip_verify = true;
        }

        if config.server.is_empty() {
            config.server = "localhost".to_string();
        }

        if !self.non_interactive {
            prompt_missing(&mut config)?;
        }

        debug!(?config, "Resolved session configuration");
        Ok(config)
    }

    pub fn into_session(self) -> Result<Session> {
        let config = self.build_config()?;
        Session::new(config).context("Invalid session configuration")
    }
}

fn prompt_missing(config: &mut SessionConfig) -> Result<()> {
    if config.topic.is_empty() {
        config.topic = Input::<String>::new()
            .with_prompt("MQTT topic")
            .interact_text()
            .context("Failed to get topic input")?;
    }
    if config.username.is_empty() {
        config.username = Input::<String>::new()
            .with_prompt("Username")
            .interact_text()
            .context("Failed to get username input")?;
    }
    if config.password.is_empty() {
        config.password = Password::new()
            .with_prompt("Password")
            .interact()
            .context("Failed to get password input")?;
    }
    Ok(())
}
