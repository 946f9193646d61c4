//! # mqtt-session
//!
//! A single-topic MQTT 3.1.1 client session: connect once with credentials,
//! subscribe to one configured topic, publish text payloads and observe
//! connected / disconnected / message-received events.
//!
//! ## Direct async, no event loop
//!
//! Every operation is a direct `async fn`. Continuous work (reading inbound
//! packets, sending PINGREQ) runs in background tokio tasks owned by the
//! session; there is no command channel or actor in between.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mqtt_session::{Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> mqtt_session::Result<()> {
//!     let config = SessionConfig::new("broker.local", 1883, "sensors/temp", "user", "secret");
//!     let session = Session::new(config)?;
//!
//!     session
//!         .on_message(|msg| println!("{}: {}", msg.topic, msg.payload))
//!         .await;
//!
//!     session.connect().await?;
//!     session.publish("21.5").await?;
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]

pub mod config;
pub mod constants;
pub mod encoding;
pub mod error;
pub mod packet;
pub mod packet_id;
pub mod session;
pub mod transport;
pub mod validation;

pub use config::{PublishPolicy, SessionConfig, TlsOptions};
pub use error::{MqttError, Result};
pub use packet::{FixedHeader, Packet, PacketType};
pub use session::{
    DisconnectReason, InboundMessage, Session, SessionEvent, SessionHandler,
};
pub use validation::{is_valid_topic_filter, is_valid_topic_name};

/// Delivery guarantee of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(MqttError::InvalidQoS(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}
