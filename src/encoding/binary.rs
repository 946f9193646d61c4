use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

/// Encodes binary data (the CONNECT password) with a 2-byte length prefix
///
/// # Errors
///
/// Returns an error if the data length exceeds 65,535 bytes
pub fn encode_binary<B: BufMut>(buf: &mut B, data: &[u8]) -> Result<()> {
    let len = u16::try_from(data.len()).map_err(|_| {
        MqttError::MalformedPacket(format!(
            "Binary data length {} exceeds maximum 65535",
            data.len()
        ))
    })?;

    buf.put_u16(len);
    buf.put_slice(data);
    Ok(())
}

/// Decodes binary data with a 2-byte length prefix
///
/// # Errors
///
/// Returns an error if there are insufficient bytes in the buffer
pub fn decode_binary<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Insufficient bytes for binary data length".to_string(),
        ));
    }

    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Insufficient bytes for binary data: expected {}, got {}",
            len,
            buf.remaining()
        )));
    }

    let mut data = vec![0u8; len];
    buf.copy_to_slice(&mut data);
    Ok(data)
}

#[must_use]
pub fn binary_len(data: &[u8]) -> usize {
    2 + data.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_encode_decode_binary() {
        let mut buf = BytesMut::new();
        let data = [0u8, 1, 2, 0xFF, 0xFE];
        encode_binary(&mut buf, &data).unwrap();
        assert_eq!(buf.len(), binary_len(&data));
        assert_eq!(&buf[..2], &[0x00, 0x05]);
        assert_eq!(decode_binary(&mut buf).unwrap(), data);
    }

    #[test]
    fn test_decode_binary_insufficient() {
        let mut buf = BytesMut::from(&[0x00][..]);
        assert!(decode_binary(&mut buf).is_err());

        let mut buf = BytesMut::from(&[0x00, 0x03, 0x01][..]);
        assert!(decode_binary(&mut buf).is_err());
    }
}
