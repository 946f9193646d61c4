pub mod packet_io;
pub mod tcp;
pub mod tls;

use crate::config::SessionConfig;
use crate::error::Result;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};

pub use packet_io::{PacketReader, PacketWriter};
pub use tcp::{TcpConfig, TcpTransport};
pub use tls::{TlsConfig, TlsTransport};

/// Read half of an established link
pub type TransportReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an established link
pub type TransportWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub trait Transport: Send {
    /// Establishes a connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Splits the connected stream into halves the reader task and the
    /// publishing side can own independently
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if `connect` has not succeeded
    fn into_split(self) -> Result<(TransportReader, TransportWriter)>
    where
        Self: Sized;
}

/// The transports a session can use
#[derive(Debug)]
pub enum TransportType {
    Tcp(TcpTransport),
    Tls(Box<TlsTransport>),
}

impl TransportType {
    /// Picks plain TCP or TLS from the session configuration
    ///
    /// # Errors
    ///
    /// Returns `Tls` if the configured certificate or key files cannot be loaded
    pub fn for_session(config: &SessionConfig) -> Result<Self> {
        let tcp = TcpConfig::new(config.server.clone(), config.port)
            .with_connect_timeout(config.connect_timeout);

        if config.use_tls {
            let tls = TlsConfig::from_options(tcp, &config.tls)?;
            Ok(Self::Tls(Box::new(TlsTransport::new(tls))))
        } else {
            Ok(Self::Tcp(TcpTransport::new(tcp)))
        }
    }
}

impl Transport for TransportType {
    async fn connect(&mut self) -> Result<()> {
        match self {
            Self::Tcp(t) => t.connect().await,
            Self::Tls(t) => t.connect().await,
        }
    }

    fn into_split(self) -> Result<(TransportReader, TransportWriter)> {
        match self {
            Self::Tcp(t) => t.into_split(),
            Self::Tls(t) => t.into_split(),
        }
    }
}
