use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::QoS;
use bytes::{Buf, BufMut};

/// Per-filter SUBACK return code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAckReturnCode {
    GrantedQoS0 = 0x00,
    GrantedQoS1 = 0x01,
    GrantedQoS2 = 0x02,
    Failure = 0x80,
}

impl SubAckReturnCode {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::GrantedQoS0),
            0x01 => Some(Self::GrantedQoS1),
            0x02 => Some(Self::GrantedQoS2),
            0x80 => Some(Self::Failure),
            _ => None,
        }
    }

    #[must_use]
    pub fn granted(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::GrantedQoS0,
            QoS::AtLeastOnce => Self::GrantedQoS1,
            QoS::ExactlyOnce => Self::GrantedQoS2,
        }
    }

    #[must_use]
    pub fn is_failure(self) -> bool {
        self == Self::Failure
    }
}

/// MQTT SUBACK packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<SubAckReturnCode>,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, return_codes: Vec<SubAckReturnCode>) -> Self {
        Self {
            packet_id,
            return_codes,
        }
    }
}

impl MqttPacket for SubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);
        for code in &self.return_codes {
            buf.put_u8(*code as u8);
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let body_len = fixed_header.remaining_length as usize;
        if body_len < 3 || buf.remaining() < body_len {
            return Err(MqttError::MalformedPacket(
                "SUBACK requires a packet identifier and at least one return code".to_string(),
            ));
        }

        let packet_id = buf.get_u16();
        let return_codes = (0..body_len - 2)
            .map(|_| {
                let code = buf.get_u8();
                SubAckReturnCode::from_u8(code).ok_or_else(|| {
                    MqttError::MalformedPacket(format!("Invalid SUBACK return code: 0x{code:02X}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            packet_id,
            return_codes,
        })
    }
}
