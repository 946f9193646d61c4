use crate::constants::{connect_flags, protocol};
use crate::encoding::{decode_binary, decode_string, encode_binary, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use bytes::{Buf, BufMut};

/// MQTT 3.1.1 CONNECT packet
///
/// Will messages are not supported; a decoded CONNECT carrying a will is
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub client_id: String,
    /// Keep-alive interval in seconds, 0 disables it
    pub keep_alive: u16,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: 60,
            clean_session: true,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    #[must_use]
    pub fn with_clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<Vec<u8>>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.username.is_some() {
            flags |= connect_flags::USERNAME;
        }
        if self.password.is_some() {
            flags |= connect_flags::PASSWORD;
        }
        if self.clean_session {
            flags |= connect_flags::CLEAN_SESSION;
        }
        flags
    }
}

impl MqttPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.password.is_some() && self.username.is_none() {
            return Err(MqttError::ProtocolError(
                "Password requires a username in MQTT 3.1.1".to_string(),
            ));
        }

        encode_string(buf, protocol::NAME)?;
        buf.put_u8(protocol::LEVEL_V311);
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.keep_alive);

        encode_string(buf, &self.client_id)?;
        if let Some(username) = &self.username {
            encode_string(buf, username)?;
        }
        if let Some(password) = &self.password {
            encode_binary(buf, password)?;
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let protocol_name = decode_string(buf)?;
        if protocol_name != protocol::NAME {
            return Err(MqttError::ProtocolError(format!(
                "Invalid protocol name: {protocol_name}"
            )));
        }

        if buf.remaining() < 4 {
            return Err(MqttError::MalformedPacket(
                "CONNECT variable header truncated".to_string(),
            ));
        }
        if buf.get_u8() != protocol::LEVEL_V311 {
            return Err(MqttError::UnsupportedProtocolVersion);
        }

        let flags = buf.get_u8();
        if flags & connect_flags::RESERVED != 0 {
            return Err(MqttError::MalformedPacket(
                "Reserved connect flag must be 0".to_string(),
            ));
        }
        if flags & (connect_flags::WILL_FLAG | connect_flags::WILL_QOS_MASK | connect_flags::WILL_RETAIN)
            != 0
        {
            return Err(MqttError::ProtocolError(
                "Will messages are not supported".to_string(),
            ));
        }
        let keep_alive = buf.get_u16();

        let client_id = decode_string(buf)?;
        let username = if flags & connect_flags::USERNAME != 0 {
            Some(decode_string(buf)?)
        } else {
            None
        };
        let password = if flags & connect_flags::PASSWORD != 0 {
            Some(decode_binary(buf)?)
        } else {
            None
        };

        Ok(Self {
            client_id,
            keep_alive,
            clean_session: flags & connect_flags::CLEAN_SESSION != 0,
            username,
            password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_connect_wire_format() {
        let packet = ConnectPacket::new("dev-1")
            .with_keep_alive(15)
            .with_credentials("user", b"pw".to_vec());

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let expected: &[u8] = &[
            0x10, 27, // fixed header
            0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
            0x04, // level
            0xC2, // username | password | clean session
            0x00, 0x0F, // keep alive
            0x00, 0x05, b'd', b'e', b'v', b'-', b'1', // client id
            0x00, 0x04, b'u', b's', b'e', b'r', // username
            0x00, 0x02, b'p', b'w', // password
        ];
        assert_eq!(&buf[..], expected);
    }

    #[test]
    fn test_connect_encode_decode() {
        let packet = ConnectPacket::new("client")
            .with_clean_session(false)
            .with_credentials("alice", b"secret".to_vec());

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = ConnectPacket::decode_body(&mut buf, &header).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_connect_without_credentials() {
        let packet = ConnectPacket::new("anon");
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        // flags byte follows the fixed header (2), protocol name (6) and level (1)
        assert_eq!(buf[9], connect_flags::CLEAN_SESSION);
    }

    #[test]
    fn test_password_without_username_rejected() {
        let mut packet = ConnectPacket::new("c");
        packet.password = Some(b"pw".to_vec());
        let mut buf = BytesMut::new();
        assert!(packet.encode(&mut buf).is_err());
    }

    #[test]
    fn test_decode_wrong_protocol_level() {
        let mut body = BytesMut::new();
        encode_string(&mut body, "MQTT").unwrap();
        body.put_u8(5);
        body.put_u8(0x02);
        body.put_u16(10);
        encode_string(&mut body, "c").unwrap();

        let header = FixedHeader::new(PacketType::Connect, 0, body.len() as u32);
        assert!(matches!(
            ConnectPacket::decode_body(&mut body, &header),
            Err(MqttError::UnsupportedProtocolVersion)
        ));
    }
}
