use crate::constants::flags;
use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::QoS;
use bytes::{Buf, BufMut};

/// A topic filter with its requested maximum `QoS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pub filter: String,
    pub qos: QoS,
}

impl TopicFilter {
    #[must_use]
    pub fn new(filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            filter: filter.into(),
            qos,
        }
    }
}

/// MQTT SUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<TopicFilter>,
}

impl SubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>, qos: QoS) -> Self {
        self.filters.push(TopicFilter::new(filter, qos));
        self
    }
}

impl MqttPacket for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn flags(&self) -> u8 {
        flags::RESERVED_0010
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(MqttError::ProtocolError(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        buf.put_u16(self.packet_id);
        for filter in &self.filters {
            encode_string(buf, &filter.filter)?;
            buf.put_u8(u8::from(filter.qos));
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let body_len = fixed_header.remaining_length as usize;
        if body_len < 2 || buf.remaining() < body_len {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE body truncated".to_string(),
            ));
        }

        let mut body = buf.copy_to_bytes(body_len);
        let packet_id = body.get_u16();

        let mut filters = Vec::new();
        while body.has_remaining() {
            let filter = decode_string(&mut body)?;
            if !body.has_remaining() {
                return Err(MqttError::MalformedPacket(
                    "Missing requested QoS".to_string(),
                ));
            }
            let qos = QoS::try_from(body.get_u8())?;
            filters.push(TopicFilter { filter, qos });
        }

        if filters.is_empty() {
            return Err(MqttError::ProtocolError(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        Ok(Self { packet_id, filters })
    }
}
