pub mod ack;
pub mod connack;
pub mod connect;
pub mod publish;
pub mod suback;
pub mod subscribe;

use crate::constants::{flags, masks};
use crate::encoding::{decode_variable_int, encode_variable_int, encoded_variable_int_len};
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

pub use ack::AckPacket;
pub use connack::{ConnAckPacket, ConnectReturnCode};
pub use connect::ConnectPacket;
pub use publish::PublishPacket;
pub use suback::{SubAckPacket, SubAckReturnCode};
pub use subscribe::{SubscribePacket, TopicFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Converts a u8 to `PacketType`; 0 and 15 are reserved in MQTT 3.1.1
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Connect),
            2 => Some(Self::ConnAck),
            3 => Some(Self::Publish),
            4 => Some(Self::PubAck),
            5 => Some(Self::PubRec),
            6 => Some(Self::PubRel),
            7 => Some(Self::PubComp),
            8 => Some(Self::Subscribe),
            9 => Some(Self::SubAck),
            10 => Some(Self::Unsubscribe),
            11 => Some(Self::UnsubAck),
            12 => Some(Self::PingReq),
            13 => Some(Self::PingResp),
            14 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        packet_type as u8
    }
}

/// MQTT packet fixed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    /// Encodes the fixed header
    ///
    /// # Errors
    ///
    /// Returns an error if the remaining length is too large
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let byte1 = (u8::from(self.packet_type) << 4) | (self.flags & masks::FLAGS);
        buf.put_u8(byte1);
        encode_variable_int(buf, self.remaining_length)
    }

    /// Decodes a fixed header from the buffer
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Insufficient bytes in buffer
    /// - Invalid packet type
    /// - Invalid remaining length
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "No data for fixed header".to_string(),
            ));
        }

        let byte1 = buf.get_u8();
        let packet_type_val = (byte1 >> 4) & masks::FLAGS;
        let flags = byte1 & masks::FLAGS;

        let packet_type = PacketType::from_u8(packet_type_val)
            .ok_or(MqttError::InvalidPacketType(packet_type_val))?;

        let remaining_length = decode_variable_int(buf)?;

        Ok(Self {
            packet_type,
            flags,
            remaining_length,
        })
    }

    /// Validates the reserved flag nibble for the packet type
    #[must_use]
    pub fn validate_flags(&self) -> bool {
        match self.packet_type {
            PacketType::Publish => true,
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => {
                self.flags == flags::RESERVED_0010
            }
            _ => self.flags == 0,
        }
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + encoded_variable_int_len(self.remaining_length)
    }
}

/// The packets a client session sends or receives
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(Box<ConnectPacket>),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(AckPacket),
    PubRec(AckPacket),
    PubRel(AckPacket),
    PubComp(AckPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Decode a packet body based on the fixed header
    ///
    /// # Errors
    ///
    /// Returns an error if the flags are invalid, the body is malformed, or
    /// the packet type is one this client never handles (UNSUBSCRIBE, UNSUBACK)
    pub fn decode_from_body<B: Buf>(fixed_header: &FixedHeader, buf: &mut B) -> Result<Self> {
        if !fixed_header.validate_flags() {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid flags 0x{:02X} for {:?}",
                fixed_header.flags, fixed_header.packet_type
            )));
        }

        match fixed_header.packet_type {
            PacketType::Connect => Ok(Packet::Connect(Box::new(ConnectPacket::decode_body(
                buf,
                fixed_header,
            )?))),
            PacketType::ConnAck => Ok(Packet::ConnAck(ConnAckPacket::decode_body(
                buf,
                fixed_header,
            )?)),
            PacketType::Publish => Ok(Packet::Publish(PublishPacket::decode_body(
                buf,
                fixed_header,
            )?)),
            PacketType::PubAck => Ok(Packet::PubAck(AckPacket::decode_body(buf, fixed_header)?)),
            PacketType::PubRec => Ok(Packet::PubRec(AckPacket::decode_body(buf, fixed_header)?)),
            PacketType::PubRel => Ok(Packet::PubRel(AckPacket::decode_body(buf, fixed_header)?)),
            PacketType::PubComp => Ok(Packet::PubComp(AckPacket::decode_body(buf, fixed_header)?)),
            PacketType::Subscribe => Ok(Packet::Subscribe(SubscribePacket::decode_body(
                buf,
                fixed_header,
            )?)),
            PacketType::SubAck => Ok(Packet::SubAck(SubAckPacket::decode_body(
                buf,
                fixed_header,
            )?)),
            PacketType::PingReq => Ok(Packet::PingReq),
            PacketType::PingResp => Ok(Packet::PingResp),
            PacketType::Disconnect => Ok(Packet::Disconnect),
            PacketType::Unsubscribe | PacketType::UnsubAck => Err(MqttError::ProtocolError(
                format!("Unexpected {:?} packet", fixed_header.packet_type),
            )),
        }
    }

    /// Encodes the complete packet, fixed header included
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be represented on the wire
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Packet::Connect(p) => p.encode(buf),
            Packet::ConnAck(p) => p.encode(buf),
            Packet::Publish(p) => p.encode(buf),
            Packet::PubAck(p) => p.encode_as(PacketType::PubAck, buf),
            Packet::PubRec(p) => p.encode_as(PacketType::PubRec, buf),
            Packet::PubRel(p) => p.encode_as(PacketType::PubRel, buf),
            Packet::PubComp(p) => p.encode_as(PacketType::PubComp, buf),
            Packet::Subscribe(p) => p.encode(buf),
            Packet::SubAck(p) => p.encode(buf),
            Packet::PingReq => FixedHeader::new(PacketType::PingReq, 0, 0).encode(buf),
            Packet::PingResp => FixedHeader::new(PacketType::PingResp, 0, 0).encode(buf),
            Packet::Disconnect => FixedHeader::new(PacketType::Disconnect, 0, 0).encode(buf),
        }
    }

    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }
}

/// Trait for MQTT packets with a body
pub trait MqttPacket: Sized {
    fn packet_type(&self) -> PacketType;

    /// Returns the fixed header flags
    fn flags(&self) -> u8 {
        0
    }

    /// Encodes the packet body (without fixed header)
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails
    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()>;

    /// Decodes the packet body (without fixed header)
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails
    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self>;

    /// Encodes the complete packet (with fixed header)
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut body = Vec::new();
        self.encode_body(&mut body)?;

        let remaining_length = u32::try_from(body.len()).map_err(|_| {
            MqttError::MalformedPacket(format!("Packet body of {} bytes is too large", body.len()))
        })?;

        FixedHeader::new(self.packet_type(), self.flags(), remaining_length).encode(buf)?;
        buf.put_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QoS;
    use bytes::BytesMut;

    fn decode(buf: &mut BytesMut) -> Packet {
        let header = FixedHeader::decode(buf).unwrap();
        assert_eq!(buf.len(), header.remaining_length as usize);
        Packet::decode_from_body(&header, buf).unwrap()
    }

    #[test]
    fn test_packet_type_from_u8() {
        assert_eq!(PacketType::from_u8(1), Some(PacketType::Connect));
        assert_eq!(PacketType::from_u8(14), Some(PacketType::Disconnect));
        assert_eq!(PacketType::from_u8(0), None);
        assert_eq!(PacketType::from_u8(15), None);
    }

    #[test]
    fn test_fixed_header_encode_decode() {
        let mut buf = BytesMut::new();
        FixedHeader::new(PacketType::Publish, 0x0D, 321)
            .encode(&mut buf)
            .unwrap();
        assert_eq!(buf.len(), 3);

        let decoded = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded.packet_type, PacketType::Publish);
        assert_eq!(decoded.flags, 0x0D);
        assert_eq!(decoded.remaining_length, 321);
        assert_eq!(decoded.encoded_len(), 3);
    }

    #[test]
    fn test_validate_flags() {
        assert!(FixedHeader::new(PacketType::Connect, 0, 0).validate_flags());
        assert!(!FixedHeader::new(PacketType::Connect, 1, 0).validate_flags());
        assert!(FixedHeader::new(PacketType::PubRel, 0x02, 0).validate_flags());
        assert!(!FixedHeader::new(PacketType::PubRel, 0x00, 0).validate_flags());
        assert!(FixedHeader::new(PacketType::Publish, 0x0F, 0).validate_flags());
    }

    #[test]
    fn test_decode_invalid_packet_type() {
        let mut buf = BytesMut::from(&[0xF0, 0x00][..]);
        assert!(matches!(
            FixedHeader::decode(&mut buf),
            Err(MqttError::InvalidPacketType(15))
        ));
    }

    #[test]
    fn test_empty_packets_wire_format() {
        for (packet, byte1) in [
            (Packet::PingReq, 0xC0),
            (Packet::PingResp, 0xD0),
            (Packet::Disconnect, 0xE0),
        ] {
            let mut buf = BytesMut::new();
            packet.encode(&mut buf).unwrap();
            assert_eq!(&buf[..], &[byte1, 0x00]);
            assert_eq!(decode(&mut buf), packet);
        }
    }

    #[test]
    fn test_pubrel_carries_reserved_flags() {
        let mut buf = BytesMut::new();
        Packet::PubRel(AckPacket::new(7)).encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x62, 0x02, 0x00, 0x07]);
        assert_eq!(decode(&mut buf), Packet::PubRel(AckPacket::new(7)));
    }

    #[test]
    fn test_publish_through_packet_enum() {
        let publish = PublishPacket::new("a/b", b"hi".to_vec(), QoS::AtLeastOnce)
            .with_packet_id(3)
            .with_retain(true);
        let mut buf = BytesMut::new();
        Packet::Publish(publish.clone()).encode(&mut buf).unwrap();
        assert_eq!(decode(&mut buf), Packet::Publish(publish));
    }

    #[test]
    fn test_unsubscribe_is_rejected() {
        let mut buf = BytesMut::from(&[0xA2, 0x02, 0x00, 0x01][..]);
        let header = FixedHeader::decode(&mut buf).unwrap();
        assert!(matches!(
            Packet::decode_from_body(&header, &mut buf),
            Err(MqttError::ProtocolError(_))
        ));
    }
}
