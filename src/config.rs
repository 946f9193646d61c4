//! Session configuration
//!
//! A [`SessionConfig`] is built in code with [`SessionConfig::new`] and the
//! `with_*` methods, or loaded from a TOML or JSON file. Durations use the
//! humantime format (`"15s"`, `"500ms"`).

use crate::error::{MqttError, Result};
use crate::validation::{validate_client_id, validate_topic_filter};
use crate::QoS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ulid::Ulid;

pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection configuration of a [`Session`](crate::Session)
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Broker host name or IP address
    pub server: String,
    pub port: u16,
    /// Topic the session subscribes to and publishes to by default
    pub topic: String,
    pub username: String,
    pub password: String,
    /// Connect over TLS instead of plain TCP
    pub use_tls: bool,
    /// Client identifier; a ULID is generated when absent or empty
    pub client_id: Option<String>,

    /// Interval between PINGREQs, zero disables keep-alive
    #[serde(with = "humantime_serde")]
    pub keep_alive: Duration,

    /// Bounds transport connect, CONNECT/CONNACK and SUBSCRIBE/SUBACK
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Bounds the orderly disconnect
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    pub publish: PublishPolicy,
    pub subscribe_qos: QoS,
    pub tls: TlsOptions,
}

/// Delivery options applied to every outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishPolicy {
    pub qos: QoS,
    pub retain: bool,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            qos: QoS::ExactlyOnce,
            retain: true,
        }
    }
}

/// Trust and identity settings used when `use_tls` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// PEM file with additional CA certificates to trust
    pub ca_cert: Option<PathBuf>,
    /// PEM client certificate chain for mutual TLS
    pub client_cert: Option<PathBuf>,
    /// PEM private key matching `client_cert`
    pub client_key: Option<PathBuf>,
    /// Trust the bundled Mozilla root certificates
    pub use_system_roots: bool,
    /// Accept any server certificate. Testing only.
    pub insecure_skip_verify: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            ca_cert: None,
            client_cert: None,
            client_key: None,
            use_system_roots: true,
            insecure_skip_verify: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_PORT,
            topic: String::new(),
            username: String::new(),
            password: String::new(),
            use_tls: false,
            client_id: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            publish: PublishPolicy::default(),
            subscribe_qos: QoS::AtMostOnce,
            tls: TlsOptions::default(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("topic", &self.topic)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("publish", &self.publish)
            .field("subscribe_qos", &self.subscribe_qos)
            .field("tls", &self.tls)
            .finish()
    }
}

impl SessionConfig {
    /// Creates a configuration with the required fields and defaults for the rest
    #[must_use]
    pub fn new(
        server: impl Into<String>,
        port: u16,
        topic: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            topic: topic.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_publish_policy(mut self, policy: PublishPolicy) -> Self {
        self.publish = policy;
        self
    }

    #[must_use]
    pub fn with_subscribe_qos(mut self, qos: QoS) -> Self {
        self.subscribe_qos = qos;
        self
    }

    #[must_use]
    pub fn with_tls_options(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Checks the fields a session cannot be established without
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the first missing or invalid field
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("server", &self.server),
            ("topic", &self.topic),
            ("username", &self.username),
            ("password", &self.password),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(MqttError::InvalidConfiguration(format!(
                "{name} is required"
            )));
        }

        if self.port == 0 {
            return Err(MqttError::InvalidConfiguration(
                "port must be non-zero".to_string(),
            ));
        }

        validate_topic_filter(&self.topic)?;

        if let Some(client_id) = &self.client_id {
            validate_client_id(client_id)?;
        }

        if self.keep_alive.as_secs() > u64::from(u16::MAX) {
            return Err(MqttError::InvalidConfiguration(format!(
                "keep_alive of {}s exceeds 65535s",
                self.keep_alive.as_secs()
            )));
        }

        // CONNECT carries whole seconds; timers must match what the broker is told
        if self.keep_alive.subsec_nanos() != 0 {
            return Err(MqttError::InvalidConfiguration(format!(
                "keep_alive must be a whole number of seconds, got {:?}",
                self.keep_alive
            )));
        }

        if self.connect_timeout.is_zero() || self.operation_timeout.is_zero() {
            return Err(MqttError::InvalidConfiguration(
                "timeouts must be non-zero".to_string(),
            ));
        }

        if self.tls.client_cert.is_some() != self.tls.client_key.is_some() {
            return Err(MqttError::InvalidConfiguration(
                "tls.client_cert and tls.client_key must be set together".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the configured client id, or a freshly generated one when it is
    /// absent or empty
    #[must_use]
    pub fn resolve_client_id(&self) -> String {
        match self.client_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Ulid::new().to_string(),
        }
    }

    /// Loads a configuration from a TOML (`.toml`) or JSON (any other
    /// extension) file
    ///
    /// The result is not validated; [`Session::new`](crate::Session::new) does that.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MqttError::InvalidConfiguration(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the document is not valid TOML for this type
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MqttError::InvalidConfiguration(format!("invalid TOML config: {e}")))
    }

    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the document is not valid JSON for this type
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| MqttError::InvalidConfiguration(format!("invalid JSON config: {e}")))
    }

    /// Keep-alive in whole seconds as sent in CONNECT
    #[must_use]
    pub(crate) fn keep_alive_secs(&self) -> u16 {
        u16::try_from(self.keep_alive.as_secs()).unwrap_or(u16::MAX)
    }

    /// Keep-alive period the background tasks run on, equal to the advertised value
    #[must_use]
    pub(crate) fn advertised_keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs()))
    }
}
