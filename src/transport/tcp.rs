use crate::error::{MqttError, Result};
use crate::transport::{Transport, TransportReader, TransportWriter};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// TCP transport configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Broker host name or IP address
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Socket nodelay option (disable Nagle's algorithm)
    pub nodelay: bool,
    /// Socket keepalive option
    pub keepalive: Option<Duration>,
}

impl TcpConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(30),
            nodelay: true,
            keepalive: Some(Duration::from_secs(60)),
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    #[must_use]
    pub fn with_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Opens the socket and applies the socket options
    pub(crate) async fn open(&self) -> Result<TcpStream> {
        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| MqttError::Timeout)??;

        stream.set_nodelay(self.nodelay)?;

        if let Some(keepalive_duration) = self.keepalive {
            let sock_ref = socket2::SockRef::from(&stream);
            let keepalive = socket2::TcpKeepalive::new().with_time(keepalive_duration);
            sock_ref.set_tcp_keepalive(&keepalive)?;
        }

        Ok(stream)
    }
}

/// Plain TCP transport
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpConfig,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    #[must_use]
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(MqttError::AlreadyConnected);
        }

        let stream = self.config.open().await?;
        tracing::debug!(host = %self.config.host, port = self.config.port, "TCP connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn into_split(self) -> Result<(TransportReader, TransportWriter)> {
        let stream = self.stream.ok_or(MqttError::NotConnected)?;
        let (reader, writer) = stream.into_split();
        Ok((Box::new(reader), Box::new(writer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_tcp_config() {
        let config = TcpConfig::new("127.0.0.1", 1883)
            .with_connect_timeout(Duration::from_secs(10))
            .with_nodelay(false)
            .with_keepalive(None);

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 1883);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(!config.nodelay);
        assert!(config.keepalive.is_none());
    }

    #[test]
    fn test_split_before_connect() {
        let transport = TcpTransport::new(TcpConfig::new("127.0.0.1", 1883));
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.into_split(),
            Err(MqttError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpTransport::new(TcpConfig::new("127.0.0.1", port));
        transport.connect().await.unwrap();
        assert!(transport.is_connected());
        assert!(matches!(
            transport.connect().await,
            Err(MqttError::AlreadyConnected)
        ));
        assert!(transport.into_split().is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = TcpTransport::new(
            TcpConfig::new("127.0.0.1", port).with_connect_timeout(Duration::from_secs(2)),
        );
        assert!(transport.connect().await.is_err());
    }
}
