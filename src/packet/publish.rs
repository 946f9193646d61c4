use crate::constants::flags;
use crate::constants::limits::MAX_REMAINING_LENGTH;
use crate::encoding::{decode_string, encode_string, string_len};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::QoS;
use bytes::{Buf, BufMut};

/// MQTT PUBLISH packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic_name: String,
    /// Present for `QoS` 1 and 2 only
    pub packet_id: Option<u16>,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic_name: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QoS) -> Self {
        Self {
            topic_name: topic_name.into(),
            packet_id: None,
            payload: payload.into(),
            qos,
            retain: false,
            dup: false,
        }
    }

    #[must_use]
    pub fn with_packet_id(mut self, id: u16) -> Self {
        self.packet_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }

    /// Checks that a PUBLISH with this topic and payload size fits the
    /// remaining length field
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the packet body would exceed 268,435,455 bytes
    pub fn check_size(topic_name: &str, payload_len: usize, qos: QoS) -> Result<()> {
        let packet_id_len = if qos == QoS::AtMostOnce { 0 } else { 2 };
        let body_len = string_len(topic_name)
            .saturating_add(packet_id_len)
            .saturating_add(payload_len);

        if body_len > MAX_REMAINING_LENGTH as usize {
            return Err(MqttError::InvalidArgument(format!(
                "PUBLISH of {body_len} bytes exceeds the {MAX_REMAINING_LENGTH} byte limit"
            )));
        }
        Ok(())
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        let mut bits = u8::from(self.qos) << flags::PUBLISH_QOS_SHIFT;
        if self.dup {
            bits |= flags::PUBLISH_DUP;
        }
        if self.retain {
            bits |= flags::PUBLISH_RETAIN;
        }
        bits
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.topic_name)?;

        if self.qos != QoS::AtMostOnce {
            let packet_id = self.packet_id.ok_or_else(|| {
                MqttError::MalformedPacket("Packet ID required for QoS > 0".to_string())
            })?;
            buf.put_u16(packet_id);
        }

        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let qos_bits = (fixed_header.flags & flags::PUBLISH_QOS_MASK) >> flags::PUBLISH_QOS_SHIFT;
        let qos = QoS::try_from(qos_bits)?;
        let dup = fixed_header.flags & flags::PUBLISH_DUP != 0;
        let retain = fixed_header.flags & flags::PUBLISH_RETAIN != 0;

        let body_len = fixed_header.remaining_length as usize;
        let start = buf.remaining();

        let topic_name = decode_string(buf)?;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            if buf.remaining() < 2 {
                return Err(MqttError::MalformedPacket(
                    "Missing packet identifier".to_string(),
                ));
            }
            Some(buf.get_u16())
        };

        let consumed = start - buf.remaining();
        let payload_len = body_len.checked_sub(consumed).ok_or_else(|| {
            MqttError::MalformedPacket("PUBLISH header exceeds remaining length".to_string())
        })?;
        if buf.remaining() < payload_len {
            return Err(MqttError::MalformedPacket(format!(
                "Insufficient bytes for payload: expected {payload_len}, got {}",
                buf.remaining()
            )));
        }
        let mut payload = vec![0u8; payload_len];
        buf.copy_to_slice(&mut payload);

        Ok(Self {
            topic_name,
            packet_id,
            payload,
            qos,
            retain,
            dup,
        })
    }
}
