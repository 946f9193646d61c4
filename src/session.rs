//! The session manager
//!
//! A [`Session`] owns one configured connection to a broker. It subscribes to
//! the configured topic on every successful connect, publishes text payloads
//! and reports lifecycle and message events to registered observers.
//!
//! State machine: constructed → connected ⇄ disconnected → disposed.
//! No automatic reconnect happens; call [`Session::connect`] again after a
//! drop. [`Session::disconnect`] is terminal.

mod events;
mod inflight;
mod tasks;

pub use events::{DisconnectReason, InboundMessage, SessionEvent, SessionHandler};

use crate::config::SessionConfig;
use crate::error::{MqttError, Result};
use crate::packet::{ConnectPacket, Packet, PublishPacket, SubAckPacket, SubscribePacket};
use crate::packet_id::PacketIdGenerator;
use crate::transport::{PacketReader, PacketWriter, Transport, TransportType, TransportWriter};
use crate::validation::validate_topic_name;
use crate::QoS;
use events::{EventDispatcher, OnConnected, OnDisconnected, OnMessage};
use inflight::InflightTracker;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tasks::BackgroundTasks;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// Writer half of the current link
///
/// `generation` increases whenever a link is installed or torn down, so
/// tasks of an earlier link cannot act on a newer one.
struct Link {
    writer: Option<TransportWriter>,
    generation: u64,
}

/// State shared between a session and its background tasks
///
/// Lock order: `link` before `inflight`.
pub(crate) struct SessionShared {
    link: Mutex<Link>,
    /// Only set to true under the `link` lock
    connected: AtomicBool,
    disposed: AtomicBool,
    packet_ids: PacketIdGenerator,
    inflight: Mutex<InflightTracker>,
    pending_subacks: Mutex<HashMap<u16, oneshot::Sender<SubAckPacket>>>,
    events: EventDispatcher,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            link: Mutex::new(Link {
                writer: None,
                generation: 0,
            }),
            connected: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            packet_ids: PacketIdGenerator::new(),
            inflight: Mutex::new(InflightTracker::default()),
            pending_subacks: Mutex::new(HashMap::new()),
            events: EventDispatcher::new(),
        }
    }

    /// Installs the writer of a freshly handshaken link and returns its generation
    async fn install_writer(&self, writer: TransportWriter) -> u64 {
        let mut link = self.link.lock().await;
        link.generation += 1;
        link.writer = Some(writer);
        self.connected.store(false, Ordering::SeqCst);
        link.generation
    }

    /// Marks the link connected unless it was lost in the meantime
    async fn mark_connected(&self, generation: u64) -> Result<()> {
        let link = self.link.lock().await;
        if link.generation != generation || link.writer.is_none() {
            return Err(MqttError::ConnectionClosed);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Writes a packet on the link of the given generation
    pub(crate) async fn send(&self, generation: u64, packet: &Packet) -> Result<()> {
        let mut link = self.link.lock().await;
        if link.generation != generation {
            return Err(MqttError::NotConnected);
        }
        let writer = link.writer.as_mut().ok_or(MqttError::NotConnected)?;
        writer.write_packet(packet).await
    }

    /// Detaches the current writer and invalidates the tasks of its link
    async fn close_link(&self) -> Option<TransportWriter> {
        let mut link = self.link.lock().await;
        link.generation += 1;
        self.connected.store(false, Ordering::SeqCst);
        link.writer.take()
    }

    /// Called by the reader task when its link ends
    ///
    /// Fires `Disconnected` only if the link had completed connecting, so
    /// each established link reports its loss exactly once.
    pub(crate) async fn link_lost(&self, generation: u64, reason: DisconnectReason) {
        let was_connected = {
            let mut link = self.link.lock().await;
            if link.generation != generation {
                return;
            }
            link.generation += 1;
            link.writer = None;
            self.connected.swap(false, Ordering::SeqCst)
        };

        // Wakes a connect() waiting for SUBACK
        self.pending_subacks.lock().await.clear();

        if was_connected {
            error!(?reason, "Connection lost");
            self.events
                .dispatch(SessionEvent::Disconnected(reason))
                .await;
        } else {
            debug!(?reason, "Link closed before the session was connected");
        }
    }
}

/// A single-topic MQTT session
///
/// `Session` is `Send + Sync`; share it behind an [`Arc`] to publish from
/// several tasks.
pub struct Session {
    config: SessionConfig,
    client_id: String,
    shared: Arc<SessionShared>,
    tasks: Mutex<Option<BackgroundTasks>>,
    connect_lock: Mutex<()>,
}

impl Session {
    /// Validates `config` without touching the network
    ///
    /// A client id is generated when none is configured. Register handlers
    /// before calling [`connect`](Self::connect) to observe the first
    /// `Connected` event.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if a required field is missing or invalid
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let client_id = config.resolve_client_id();

        Ok(Self {
            config,
            client_id,
            shared: Arc::new(SessionShared::new()),
            tasks: Mutex::new(None),
            connect_lock: Mutex::new(()),
        })
    }

    /// Validates `config` and connects in one step
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` or `ConnectionFailed`
    pub async fn connect_with(config: SessionConfig) -> Result<Self> {
        let session = Self::new(config)?;
        session.connect().await?;
        Ok(session)
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// True once [`disconnect`](Self::disconnect) has been called
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// Number of outbound `QoS` 1/2 publishes still awaiting acknowledgement
    pub async fn inflight_count(&self) -> usize {
        self.shared.inflight.lock().await.outbound_len()
    }

    pub async fn add_handler(&self, handler: Arc<dyn SessionHandler>) {
        self.shared.events.add(handler).await;
    }

    pub async fn on_connected<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_handler(Arc::new(OnConnected(callback))).await;
    }

    pub async fn on_disconnected<F>(&self, callback: F)
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.add_handler(Arc::new(OnDisconnected(callback))).await;
    }

    pub async fn on_message<F>(&self, callback: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.add_handler(Arc::new(OnMessage(callback))).await;
    }

    /// Subscribes to the event stream
    ///
    /// Receivers that fall more than 64 events behind observe
    /// `RecvError::Lagged`.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Connects to the broker and subscribes to the configured topic
    ///
    /// Succeeds immediately when already connected. Fires `Connected` once
    /// SUBACK has been received. The whole handshake is bounded by
    /// `connect_timeout`.
    ///
    /// # Errors
    ///
    /// - `Disposed` after [`disconnect`](Self::disconnect)
    /// - `ConnectionFailed` wrapping the transport, refusal or timeout cause
    #[instrument(skip(self), fields(client_id = %self.client_id, server = %self.config.server, port = self.config.port))]
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;

        if self.is_disposed() {
            return Err(MqttError::Disposed);
        }
        if self.is_connected() {
            debug!("Already connected");
            return Ok(());
        }

        self.stop_tasks().await;

        let result = match timeout(self.config.connect_timeout, self.establish()).await {
            Ok(result) => result,
            Err(_) => Err(MqttError::Timeout),
        };

        match result {
            Ok(()) => {
                info!(topic = %self.config.topic, "Connected and subscribed");
                self.shared.events.dispatch(SessionEvent::Connected).await;
                Ok(())
            }
            Err(e) => {
                self.stop_tasks().await;
                drop(self.shared.close_link().await);
                self.shared.pending_subacks.lock().await.clear();
                error!(error = %e, "Connect failed");
                Err(MqttError::connection_failed(e))
            }
        }
    }

    async fn establish(&self) -> Result<()> {
        let mut transport = TransportType::for_session(&self.config)?;
        transport.connect().await?;
        let (mut reader, mut writer) = transport.into_split()?;

        let connect = ConnectPacket::new(self.client_id.as_str())
            .with_keep_alive(self.config.keep_alive_secs())
            .with_clean_session(true)
            .with_credentials(self.config.username.as_str(), self.config.password.as_bytes());
        writer
            .write_packet(&Packet::Connect(Box::new(connect)))
            .await?;

        match reader.read_packet().await? {
            Packet::ConnAck(ack) if ack.return_code.is_accepted() => {
                debug!(session_present = ack.session_present, "CONNACK accepted");
            }
            Packet::ConnAck(ack) => return Err(MqttError::ConnectionRefused(ack.return_code)),
            other => {
                return Err(MqttError::ProtocolError(format!(
                    "Expected CONNACK, received {:?}",
                    other.packet_type()
                )))
            }
        }

        let generation = self.shared.install_writer(writer).await;
        self.shared.inflight.lock().await.clear();
        *self.tasks.lock().await = Some(BackgroundTasks::spawn(
            reader,
            &self.shared,
            generation,
            self.config.advertised_keep_alive(),
        ));

        self.subscribe(generation).await?;
        self.shared.mark_connected(generation).await
    }

    async fn subscribe(&self, generation: u64) -> Result<()> {
        let packet_id = {
            let inflight = self.shared.inflight.lock().await;
            self.shared
                .packet_ids
                .next_free(|id| inflight.contains(id))?
        };

        let (tx, rx) = oneshot::channel();
        self.shared.pending_subacks.lock().await.insert(packet_id, tx);

        let subscribe =
            SubscribePacket::new(packet_id).add_filter(self.config.topic.as_str(), self.config.subscribe_qos);
        self.shared
            .send(generation, &Packet::Subscribe(subscribe))
            .await?;

        let suback = rx.await.map_err(|_| MqttError::ConnectionClosed)?;
        if suback.return_codes.iter().any(|code| code.is_failure()) {
            warn!(topic = %self.config.topic, "Broker rejected the subscription");
        } else {
            debug!(topic = %self.config.topic, codes = ?suback.return_codes, "Subscribed");
        }
        Ok(())
    }

    /// Publishes a text payload to the configured topic
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `payload` is empty or the configured topic
    /// contains wildcards
    pub async fn publish(&self, payload: &str) -> Result<()> {
        self.publish_to(&self.config.topic, payload).await
    }

    /// Publishes a text payload to `topic` using the configured publish policy
    ///
    /// Returns once the PUBLISH is written; acknowledgements are handled in
    /// the background. While not connected the call does nothing. A write
    /// failure is logged and the reader reports the lost link.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `payload` or `topic` is empty, `topic`
    /// contains a wildcard or null character, or the message is too large to
    /// encode
    pub async fn publish_to(&self, topic: &str, payload: &str) -> Result<()> {
        if payload.is_empty() {
            return Err(MqttError::InvalidArgument(
                "payload must not be empty".to_string(),
            ));
        }
        validate_topic_name(topic)?;
        PublishPacket::check_size(topic, payload.len(), self.config.publish.qos)?;

        let mut link = self.shared.link.lock().await;
        if !self.is_connected() {
            debug!(topic, "Not connected, publish skipped");
            return Ok(());
        }

        let policy = self.config.publish;
        let mut publish =
            PublishPacket::new(topic, payload.as_bytes(), policy.qos).with_retain(policy.retain);

        let packet_id = if policy.qos == QoS::AtMostOnce {
            None
        } else {
            let mut inflight = self.shared.inflight.lock().await;
            match self.shared.packet_ids.next_free(|id| inflight.contains(id)) {
                Ok(id) => {
                    inflight.track_publish(id, policy.qos);
                    publish = publish.with_packet_id(id);
                    Some(id)
                }
                Err(e) => {
                    warn!(topic, error = %e, "Publish dropped");
                    return Ok(());
                }
            }
        };

        let Some(writer) = link.writer.as_mut() else {
            debug!(topic, "Link already closed, publish skipped");
            return Ok(());
        };

        match writer.write_packet(&Packet::Publish(publish)).await {
            Ok(()) => debug!(topic, ?packet_id, qos = ?policy.qos, "Published"),
            Err(e) => {
                warn!(topic, error = %e, "Publish write failed");
                if let Some(id) = packet_id {
                    self.shared.inflight.lock().await.forget(id);
                }
            }
        }
        Ok(())
    }

    /// Disconnects and disposes the session
    ///
    /// Sends DISCONNECT when connected, bounded by `operation_timeout`, then
    /// stops the background tasks. The session reports not connected
    /// afterwards in every case. Later calls return `Ok(())` without effect.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if the orderly disconnect failed; the
    /// session is torn down regardless.
    #[instrument(skip(self), fields(client_id = %self.client_id))]
    pub async fn disconnect(&self) -> Result<()> {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;
        let was_connected = self.shared.connected.swap(false, Ordering::SeqCst);

        let result = match timeout(self.config.operation_timeout, self.close_gracefully(was_connected)).await {
            Ok(result) => result,
            Err(_) => Err(MqttError::Timeout),
        };

        self.stop_tasks().await;
        self.shared.pending_subacks.lock().await.clear();

        if was_connected {
            info!("Disconnected");
            self.shared
                .events
                .dispatch(SessionEvent::Disconnected(DisconnectReason::ClientInitiated))
                .await;
        }

        result.map_err(|e| {
            warn!(error = %e, "Orderly disconnect failed");
            MqttError::connection_failed(e)
        })
    }

    async fn close_gracefully(&self, was_connected: bool) -> Result<()> {
        let Some(mut writer) = self.shared.close_link().await else {
            return Ok(());
        };
        if was_connected {
            writer.write_packet(&Packet::Disconnect).await?;
            writer.shutdown().await?;
        }
        Ok(())
    }

    async fn stop_tasks(&self) {
        if let Some(tasks) = self.tasks.lock().await.take() {
            tasks.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.get_mut().take() {
            tasks.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("server", &self.config.server)
            .field("topic", &self.config.topic)
            .field("connected", &self.is_connected())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
