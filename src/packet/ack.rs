use super::{FixedHeader, PacketType};
use crate::constants::flags;
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

/// Body shared by PUBACK, PUBREC, PUBREL and PUBCOMP: a packet identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub packet_id: u16,
}

impl AckPacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }

    /// Encodes this body under the given acknowledgement packet type
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if `packet_type` is not an acknowledgement type
    pub fn encode_as<B: BufMut>(&self, packet_type: PacketType, buf: &mut B) -> Result<()> {
        let header_flags = match packet_type {
            PacketType::PubAck | PacketType::PubRec | PacketType::PubComp => 0,
            PacketType::PubRel => flags::RESERVED_0010,
            other => {
                return Err(MqttError::ProtocolError(format!(
                    "{other:?} is not an acknowledgement packet"
                )))
            }
        };

        FixedHeader::new(packet_type, header_flags, 2).encode(buf)?;
        buf.put_u16(self.packet_id);
        Ok(())
    }

    /// Decodes the packet identifier
    ///
    /// # Errors
    ///
    /// Returns an error if the body is shorter than two bytes or the id is 0
    pub fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        if fixed_header.remaining_length != 2 || buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(format!(
                "{:?} must carry exactly a packet identifier",
                fixed_header.packet_type
            )));
        }

        let packet_id = buf.get_u16();
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "Packet identifier must not be 0".to_string(),
            ));
        }
        Ok(Self { packet_id })
    }
}
