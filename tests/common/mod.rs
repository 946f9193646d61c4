//! In-process broker for integration tests
//!
//! [`FakeBroker`] listens on a loopback port, speaks just enough MQTT 3.1.1
//! to complete the client's handshakes and forwards every packet it
//! receives to the test. Tests can inject packets or drop the link.

#![allow(dead_code)]

use mqtt_session::packet::{
    AckPacket, ConnAckPacket, ConnectReturnCode, SubAckPacket, SubAckReturnCode,
};
use mqtt_session::transport::{PacketReader, PacketWriter};
use mqtt_session::{Packet, QoS, SessionConfig, SessionEvent};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Default timeout for waiting on packets and events
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const TEST_TOPIC: &str = "plant/line1/temperature";

/// How the broker answers the client
#[derive(Debug, Clone)]
pub struct BrokerBehavior {
    pub connack: ConnectReturnCode,
    pub suback: SubAckReturnCode,
    pub answer_pings: bool,
    /// Answer the client's PUBREC with PUBREL
    pub release_inbound: bool,
}

impl Default for BrokerBehavior {
    fn default() -> Self {
        Self {
            connack: ConnectReturnCode::Accepted,
            suback: SubAckReturnCode::GrantedQoS0,
            answer_pings: true,
            release_inbound: true,
        }
    }
}

impl BrokerBehavior {
    fn reply_to(&self, packet: &Packet) -> Option<Packet> {
        match packet {
            Packet::Connect(_) => Some(Packet::ConnAck(ConnAckPacket::new(false, self.connack))),
            Packet::Subscribe(subscribe) => Some(Packet::SubAck(SubAckPacket::new(
                subscribe.packet_id,
                vec![self.suback; subscribe.filters.len()],
            ))),
            Packet::Publish(publish) => match (publish.qos, publish.packet_id) {
                (QoS::AtLeastOnce, Some(id)) => Some(Packet::PubAck(AckPacket::new(id))),
                (QoS::ExactlyOnce, Some(id)) => Some(Packet::PubRec(AckPacket::new(id))),
                _ => None,
            },
            Packet::PubRel(ack) => Some(Packet::PubComp(*ack)),
            Packet::PubRec(ack) if self.release_inbound => Some(Packet::PubRel(*ack)),
            Packet::PingReq if self.answer_pings => Some(Packet::PingResp),
            _ => None,
        }
    }
}

enum Control {
    Send(Packet),
    CloseLink,
}

pub struct FakeBroker {
    pub addr: SocketAddr,
    packets: mpsc::UnboundedReceiver<Packet>,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

impl FakeBroker {
    pub async fn start() -> Self {
        Self::with_behavior(BrokerBehavior::default()).await
    }

    pub async fn with_behavior(behavior: BrokerBehavior) -> Self {
        Self::spawn(behavior, None).await
    }

    /// Broker that terminates TLS with `acceptor` before speaking MQTT
    pub async fn with_tls(acceptor: TlsAcceptor) -> Self {
        Self::spawn(BrokerBehavior::default(), Some(acceptor)).await
    }

    async fn spawn(behavior: BrokerBehavior, acceptor: Option<TlsAcceptor>) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (packet_tx, packets) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(serve(listener, acceptor, behavior, packet_tx, control_rx));

        Self {
            addr,
            packets,
            control,
            task,
        }
    }

    /// Session configuration pointing at this broker
    pub fn config(&self) -> SessionConfig {
        SessionConfig::new("127.0.0.1", self.addr.port(), TEST_TOPIC, "gateway", "s3cret")
            .with_connect_timeout(Duration::from_secs(2))
            .with_operation_timeout(Duration::from_secs(2))
    }

    /// Next packet the client sent
    pub async fn next_packet(&mut self) -> Packet {
        timeout(DEFAULT_TIMEOUT, self.packets.recv())
            .await
            .expect("Timed out waiting for a packet")
            .expect("Broker stopped")
    }

    /// Skips the CONNECT and SUBSCRIBE of a completed handshake
    pub async fn skip_handshake(&mut self) {
        assert!(matches!(self.next_packet().await, Packet::Connect(_)));
        assert!(matches!(self.next_packet().await, Packet::Subscribe(_)));
    }

    pub async fn assert_no_packet(&mut self, wait: Duration) {
        if let Ok(Some(packet)) = timeout(wait, self.packets.recv()).await {
            panic!("Unexpected packet: {packet:?}");
        }
    }

    pub fn send(&self, packet: Packet) {
        self.control.send(Control::Send(packet)).unwrap();
    }

    /// Closes the current client connection from the broker side
    pub fn close_link(&self) {
        self.control.send(Control::CloseLink).unwrap();
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    behavior: BrokerBehavior,
    packets: mpsc::UnboundedSender<Packet>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    while let Ok((stream, _)) = listener.accept().await {
        match &acceptor {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls) => serve_link(tls, &behavior, &packets, &mut control).await,
                Err(e) => tracing::debug!(error = %e, "Fake broker TLS handshake failed"),
            },
            None => serve_link(stream, &behavior, &packets, &mut control).await,
        }
    }
}

async fn serve_link<S>(
    stream: S,
    behavior: &BrokerBehavior,
    packets: &mpsc::UnboundedSender<Packet>,
    control: &mut mpsc::UnboundedReceiver<Control>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    // Reading happens on its own task; read_packet is not cancel safe
    let (inbound_tx, mut inbound) = mpsc::unbounded_channel();
    let read_task = tokio::spawn(async move {
        while let Ok(packet) = reader.read_packet().await {
            if inbound_tx.send(packet).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            packet = inbound.recv() => {
                let Some(packet) = packet else { break };
                let reply = behavior.reply_to(&packet);
                let _ = packets.send(packet);
                if let Some(reply) = reply {
                    if writer.write_packet(&reply).await.is_err() {
                        break;
                    }
                }
            }
            command = control.recv() => match command {
                Some(Control::Send(packet)) => {
                    if writer.write_packet(&packet).await.is_err() {
                        break;
                    }
                }
                Some(Control::CloseLink) | None => break,
            },
        }
    }

    let _ = writer.shutdown().await;
    read_task.abort();
}

/// Routes library logs to the test output; filter with `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Next session event, failing the test after [`DEFAULT_TIMEOUT`]
pub async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    timeout(DEFAULT_TIMEOUT, events.recv())
        .await
        .expect("Timed out waiting for an event")
        .expect("Event channel closed")
}

pub async fn assert_no_event(events: &mut broadcast::Receiver<SessionEvent>, wait: Duration) {
    if let Ok(Ok(event)) = timeout(wait, events.recv()).await {
        panic!("Unexpected event: {event:?}");
    }
}

/// Waits until the session has no unacknowledged publishes
pub async fn wait_for_empty_inflight(session: &mqtt_session::Session) {
    timeout(DEFAULT_TIMEOUT, async {
        while session.inflight_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Publishes were never acknowledged");
}
