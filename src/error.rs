use crate::packet::connack::ConnectReturnCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

/// Errors raised by the session and the protocol layers beneath it
///
/// Callers of [`Session`](crate::Session) only ever see three categories:
///
/// - **Configuration**: `InvalidConfiguration`, raised before any network I/O
/// - **Arguments**: `InvalidArgument`, raised by publish for empty or invalid input
/// - **Connection**: `ConnectionFailed`, wrapping the transport or protocol cause
///
/// The remaining variants are produced by the codec and transport modules and
/// surface wrapped inside `ConnectionFailed` at the session boundary.
///
/// # Examples
///
/// ```
/// use mqtt_session::{MqttError, Result};
///
/// fn require_topic(topic: &str) -> Result<()> {
///     if topic.is_empty() {
///         return Err(MqttError::InvalidArgument("topic must not be empty".to_string()));
///     }
///     Ok(())
/// }
///
/// assert!(require_topic("").is_err());
/// ```
#[derive(Error, Debug, Clone)]
pub enum MqttError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] Box<MqttError>),

    #[error("Session has been disposed")]
    Disposed,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Connection refused: {0:?}")]
    ConnectionRefused(ConnectReturnCode),

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Timeout")]
    Timeout,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("Unsupported protocol version")]
    UnsupportedProtocolVersion,

    #[error("Packet ID exhausted")]
    PacketIdExhausted,
}

impl MqttError {
    /// Wraps a lower-level failure the way connect and disconnect report it
    #[must_use]
    pub fn connection_failed(cause: MqttError) -> Self {
        match cause {
            already @ MqttError::ConnectionFailed(_) => already,
            other => MqttError::ConnectionFailed(Box::new(other)),
        }
    }

    /// Returns the wrapped cause of a `ConnectionFailed` error
    #[must_use]
    pub fn cause(&self) -> Option<&MqttError> {
        match self {
            MqttError::ConnectionFailed(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => MqttError::ConnectionClosed,
            _ => MqttError::Io(err.to_string()),
        }
    }
}
