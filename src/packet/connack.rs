use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use bytes::{Buf, BufMut};

/// CONNACK return code (MQTT 3.1.1 section 3.2.2.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernameOrPassword = 4,
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Accepted),
            1 => Some(Self::UnacceptableProtocolVersion),
            2 => Some(Self::IdentifierRejected),
            3 => Some(Self::ServerUnavailable),
            4 => Some(Self::BadUsernameOrPassword),
            5 => Some(Self::NotAuthorized),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

/// MQTT CONNACK packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAckPacket {
    /// Session present flag
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    #[must_use]
    pub fn new(session_present: bool, return_code: ConnectReturnCode) -> Self {
        Self {
            session_present,
            return_code,
        }
    }
}

impl MqttPacket for ConnAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(u8::from(self.session_present));
        buf.put_u8(self.return_code as u8);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "CONNACK requires 2 bytes".to_string(),
            ));
        }

        let ack_flags = buf.get_u8();
        if ack_flags & 0xFE != 0 {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid CONNACK acknowledge flags: 0x{ack_flags:02X}"
            )));
        }

        let code = buf.get_u8();
        let return_code = ConnectReturnCode::from_u8(code).ok_or_else(|| {
            MqttError::MalformedPacket(format!("Invalid CONNACK return code: {code}"))
        })?;

        Ok(Self {
            session_present: ack_flags & 0x01 != 0,
            return_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_connack_encode_decode() {
        let packet = ConnAckPacket::new(true, ConnectReturnCode::Accepted);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x20, 0x02, 0x01, 0x00]);

        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = ConnAckPacket::decode_body(&mut buf, &header).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.return_code.is_accepted());
    }

    #[test]
    fn test_connack_refused_codes() {
        for code in 1..=5u8 {
            let rc = ConnectReturnCode::from_u8(code).unwrap();
            assert!(!rc.is_accepted());
            assert_eq!(rc as u8, code);
        }
        assert_eq!(ConnectReturnCode::from_u8(6), None);
    }

    #[test]
    fn test_connack_invalid_flags() {
        let header = FixedHeader::new(PacketType::ConnAck, 0, 2);
        let mut buf = BytesMut::from(&[0x02, 0x00][..]);
        assert!(ConnAckPacket::decode_body(&mut buf, &header).is_err());
    }

    #[test]
    fn test_connack_truncated() {
        let header = FixedHeader::new(PacketType::ConnAck, 0, 1);
        let mut buf = BytesMut::from(&[0x00][..]);
        assert!(ConnAckPacket::decode_body(&mut buf, &header).is_err());
    }
}
