//! Background tasks of an established link
//!
//! Each task is a plain async function spawned on the tokio runtime: one
//! reads and handles inbound packets, the other sends PINGREQ.

use super::events::{DisconnectReason, InboundMessage, SessionEvent};
use super::SessionShared;
use crate::error::{MqttError, Result};
use crate::packet::{AckPacket, Packet, PublishPacket};
use crate::transport::{PacketReader, TransportReader};
use crate::QoS;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};

/// Handles of the tasks serving one link
pub(crate) struct BackgroundTasks {
    reader: JoinHandle<()>,
    keepalive: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Spawns the reader and, when `keep_alive` is non-zero, the keep-alive task
    pub(crate) fn spawn(
        reader: TransportReader,
        shared: &Arc<SessionShared>,
        generation: u64,
        keep_alive: Duration,
    ) -> Self {
        let idle_limit = (!keep_alive.is_zero()).then(|| keep_alive.mul_f64(1.5));

        let reader = tokio::spawn(packet_reader_task(
            reader,
            Arc::clone(shared),
            generation,
            idle_limit,
        ));
        let keepalive = (!keep_alive.is_zero()).then(|| {
            tokio::spawn(keepalive_task(Arc::clone(shared), generation, keep_alive))
        });

        Self { reader, keepalive }
    }

    pub(crate) fn abort(self) {
        self.reader.abort();
        if let Some(keepalive) = self.keepalive {
            keepalive.abort();
        }
    }
}

/// Reads packets until the link fails, then reports the loss once
pub(crate) async fn packet_reader_task(
    mut reader: TransportReader,
    shared: Arc<SessionShared>,
    generation: u64,
    idle_limit: Option<Duration>,
) {
    let reason = loop {
        let next = match idle_limit {
            Some(limit) => match timeout(limit, reader.read_packet()).await {
                Ok(result) => result,
                Err(_) => break DisconnectReason::KeepAliveTimeout,
            },
            None => reader.read_packet().await,
        };

        let outcome = match next {
            Ok(packet) => handle_incoming_packet(&shared, generation, packet).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            tracing::debug!(error = %e, "Reader stopping");
            break DisconnectReason::from_error(&e);
        }
    };

    shared.link_lost(generation, reason).await;
}

/// Sends PINGREQ every `keep_alive` until a write fails
pub(crate) async fn keepalive_task(
    shared: Arc<SessionShared>,
    generation: u64,
    keep_alive: Duration,
) {
    let mut ticker = interval(keep_alive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if let Err(e) = shared.send(generation, &Packet::PingReq).await {
            tracing::debug!(error = %e, "Keep-alive stopping");
            break;
        }
        tracing::trace!("Sent PINGREQ");
    }
}

/// Handles one packet received from the broker
///
/// # Errors
///
/// Returns an error if an acknowledgement cannot be written or the broker
/// sent a packet a client must never receive
pub(crate) async fn handle_incoming_packet(
    shared: &SessionShared,
    generation: u64,
    packet: Packet,
) -> Result<()> {
    match packet {
        Packet::Publish(publish) => handle_publish(shared, generation, publish).await,
        Packet::PubAck(ack) => {
            if !shared.inflight.lock().await.on_puback(ack.packet_id) {
                tracing::debug!(packet_id = ack.packet_id, "PUBACK for unknown packet id");
            }
            Ok(())
        }
        Packet::PubRec(ack) => {
            let known = shared.inflight.lock().await.on_pubrec(ack.packet_id);
            if !known {
                tracing::debug!(packet_id = ack.packet_id, "PUBREC for unknown packet id");
            }
            shared.send(generation, &Packet::PubRel(ack)).await
        }
        Packet::PubComp(ack) => {
            if !shared.inflight.lock().await.on_pubcomp(ack.packet_id) {
                tracing::debug!(packet_id = ack.packet_id, "PUBCOMP for unknown packet id");
            }
            Ok(())
        }
        Packet::PubRel(ack) => {
            shared.inflight.lock().await.release_inbound(ack.packet_id);
            shared.send(generation, &Packet::PubComp(ack)).await
        }
        Packet::SubAck(suback) => {
            match shared.pending_subacks.lock().await.remove(&suback.packet_id) {
                Some(tx) => {
                    let _ = tx.send(suback);
                }
                None => {
                    tracing::debug!(packet_id = suback.packet_id, "Unsolicited SUBACK");
                }
            }
            Ok(())
        }
        Packet::PingResp => {
            tracing::trace!("Received PINGRESP");
            Ok(())
        }
        other => Err(MqttError::ProtocolError(format!(
            "Unexpected {:?} packet from server",
            other.packet_type()
        ))),
    }
}

async fn handle_publish(
    shared: &SessionShared,
    generation: u64,
    publish: PublishPacket,
) -> Result<()> {
    match publish.qos {
        QoS::AtMostOnce => deliver(shared, &publish).await,
        QoS::AtLeastOnce => {
            let packet_id = required_packet_id(&publish)?;
            shared
                .send(generation, &Packet::PubAck(AckPacket::new(packet_id)))
                .await?;
            deliver(shared, &publish).await;
        }
        QoS::ExactlyOnce => {
            let packet_id = required_packet_id(&publish)?;
            let first_delivery = shared.inflight.lock().await.begin_inbound(packet_id);
            shared
                .send(generation, &Packet::PubRec(AckPacket::new(packet_id)))
                .await?;

            if first_delivery {
                deliver(shared, &publish).await;
            } else {
                tracing::debug!(packet_id, "Duplicate QoS 2 publish suppressed");
            }
        }
    }
    Ok(())
}

fn required_packet_id(publish: &PublishPacket) -> Result<u16> {
    match publish.packet_id {
        Some(id) if id != 0 => Ok(id),
        _ => Err(MqttError::MalformedPacket(
            "QoS > 0 publish without packet identifier".to_string(),
        )),
    }
}

async fn deliver(shared: &SessionShared, publish: &PublishPacket) {
    match InboundMessage::from_publish(publish) {
        Some(message) => {
            tracing::debug!(topic = %message.topic, bytes = publish.payload.len(), "Message received");
            shared
                .events
                .dispatch(SessionEvent::MessageReceived(message))
                .await;
        }
        None => tracing::debug!("Ignoring message with blank topic"),
    }
}
