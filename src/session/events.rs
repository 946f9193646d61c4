//! Session events and the observers that receive them

use crate::error::MqttError;
use crate::packet::PublishPacket;
use crate::QoS;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why an established link ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    ClientInitiated,
    /// The broker closed the connection
    ServerClosed,
    NetworkError(String),
    ProtocolError(String),
    /// Nothing was received for one and a half keep-alive periods
    KeepAliveTimeout,
}

impl DisconnectReason {
    pub(crate) fn from_error(err: &MqttError) -> Self {
        match err {
            MqttError::ConnectionClosed => Self::ServerClosed,
            MqttError::Io(msg) => Self::NetworkError(msg.clone()),
            MqttError::MalformedPacket(_)
            | MqttError::ProtocolError(_)
            | MqttError::InvalidPacketType(_)
            | MqttError::InvalidQoS(_) => Self::ProtocolError(err.to_string()),
            other => Self::NetworkError(other.to_string()),
        }
    }
}

/// An application message received on the subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    /// Payload decoded as UTF-8; invalid sequences become U+FFFD
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

impl InboundMessage {
    /// Returns `None` for messages whose topic is empty or whitespace
    pub(crate) fn from_publish(publish: &PublishPacket) -> Option<Self> {
        if publish.topic_name.trim().is_empty() {
            return None;
        }

        Some(Self {
            topic: publish.topic_name.clone(),
            payload: String::from_utf8_lossy(&publish.payload).into_owned(),
            qos: publish.qos,
            retain: publish.retain,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connected and subscribed to the configured topic
    Connected,
    Disconnected(DisconnectReason),
    MessageReceived(InboundMessage),
}

/// Observer of session events
///
/// Every method defaults to a no-op. `on_connected` runs inside
/// [`Session::connect`](crate::Session::connect) before it returns, and
/// `on_disconnected` for a client-initiated disconnect inside
/// [`Session::disconnect`](crate::Session::disconnect). Messages and every
/// other disconnect are reported from the session's reader task, so
/// long-running work should be handed off.
///
/// ```
/// use mqtt_session::{InboundMessage, SessionHandler};
///
/// struct Printer;
///
/// impl SessionHandler for Printer {
///     fn on_message(&self, message: &InboundMessage) {
///         println!("{} => {}", message.topic, message.payload);
///     }
/// }
/// ```
pub trait SessionHandler: Send + Sync {
    fn on_connected(&self) {}

    fn on_disconnected(&self, _reason: &DisconnectReason) {}

    fn on_message(&self, _message: &InboundMessage) {}
}

pub(crate) struct OnConnected<F>(pub(crate) F);

impl<F: Fn() + Send + Sync> SessionHandler for OnConnected<F> {
    fn on_connected(&self) {
        (self.0)();
    }
}

pub(crate) struct OnDisconnected<F>(pub(crate) F);

impl<F: Fn(&DisconnectReason) + Send + Sync> SessionHandler for OnDisconnected<F> {
    fn on_disconnected(&self, reason: &DisconnectReason) {
        (self.0)(reason);
    }
}

pub(crate) struct OnMessage<F>(pub(crate) F);

impl<F: Fn(&InboundMessage) + Send + Sync> SessionHandler for OnMessage<F> {
    fn on_message(&self, message: &InboundMessage) {
        (self.0)(message);
    }
}

/// Fans events out to registered handlers and broadcast subscribers
pub(crate) struct EventDispatcher {
    handlers: RwLock<Vec<Arc<dyn SessionHandler>>>,
    sender: broadcast::Sender<SessionEvent>,
}

impl EventDispatcher {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            handlers: RwLock::new(Vec::new()),
            sender,
        }
    }

    pub(crate) async fn add(&self, handler: Arc<dyn SessionHandler>) {
        self.handlers.write().await.push(handler);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub(crate) async fn dispatch(&self, event: SessionEvent) {
        // Clone the list so handlers may register more handlers
        let handlers = self.handlers.read().await.clone();

        for handler in &handlers {
            match &event {
                SessionEvent::Connected => handler.on_connected(),
                SessionEvent::Disconnected(reason) => handler.on_disconnected(reason),
                SessionEvent::MessageReceived(message) => handler.on_message(message),
            }
        }

        // No receivers is fine
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_from_publish_lossy_utf8() {
        let publish = PublishPacket::new("a/b", vec![b'o', b'k', 0xFF], QoS::AtLeastOnce);
        let message = InboundMessage::from_publish(&publish).unwrap();
        assert_eq!(message.topic, "a/b");
        assert_eq!(message.payload, "ok\u{FFFD}");
        assert_eq!(message.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn test_from_publish_blank_topic() {
        let publish = PublishPacket::new("  ", b"x".to_vec(), QoS::AtMostOnce);
        assert!(InboundMessage::from_publish(&publish).is_none());
    }

    #[test]
    fn test_reason_from_error() {
        assert_eq!(
            DisconnectReason::from_error(&MqttError::ConnectionClosed),
            DisconnectReason::ServerClosed
        );
        assert!(matches!(
            DisconnectReason::from_error(&MqttError::Io("reset".into())),
            DisconnectReason::NetworkError(msg) if msg == "reset"
        ));
        assert!(matches!(
            DisconnectReason::from_error(&MqttError::InvalidPacketType(15)),
            DisconnectReason::ProtocolError(_)
        ));
    }

    #[tokio::test]
    async fn test_dispatch_reaches_handlers_and_channel() {
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();

        let connected = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connected);
        dispatcher
            .add(Arc::new(OnConnected(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })))
            .await;

        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        dispatcher
            .add(Arc::new(OnDisconnected(move |reason: &DisconnectReason| {
                sink.lock().unwrap().push(reason.clone());
            })))
            .await;

        dispatcher.dispatch(SessionEvent::Connected).await;
        dispatcher
            .dispatch(SessionEvent::Disconnected(DisconnectReason::KeepAliveTimeout))
            .await;

        assert_eq!(connected.load(Ordering::SeqCst), 1);
        assert_eq!(
            *reasons.lock().unwrap(),
            vec![DisconnectReason::KeepAliveTimeout]
        );
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Connected);
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::Disconnected(DisconnectReason::KeepAliveTimeout)
        );
    }

    #[tokio::test]
    async fn test_dispatch_without_receivers() {
        let dispatcher = EventDispatcher::new();
        dispatcher.dispatch(SessionEvent::Connected).await;
    }
}
