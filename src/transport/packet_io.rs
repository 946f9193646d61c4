//! Packet framing over any async byte stream
//!
//! Direct async methods for reading and writing whole MQTT packets; the
//! session's reader task and publishers call them on the split halves.

use crate::constants::{limits, masks};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, Packet};
use bytes::{BufMut, BytesMut};
use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub trait PacketReader {
    /// Reads one complete packet
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` on end of stream, or a decode error
    fn read_packet(&mut self) -> impl Future<Output = Result<Packet>> + Send;
}

pub trait PacketWriter {
    /// Encodes and writes one packet, then flushes
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails
    fn write_packet(&mut self, packet: &Packet) -> impl Future<Output = Result<()>> + Send;
}

impl<R: AsyncRead + Unpin + Send> PacketReader for R {
    async fn read_packet(&mut self) -> Result<Packet> {
        let mut header_buf = BytesMut::with_capacity(1 + limits::MAX_REMAINING_LENGTH_BYTES);
        header_buf.put_u8(self.read_u8().await?);

        loop {
            let byte = self.read_u8().await?;
            header_buf.put_u8(byte);

            if byte & masks::CONTINUATION_BIT == 0 {
                break;
            }
            if header_buf.len() > limits::MAX_REMAINING_LENGTH_BYTES {
                return Err(MqttError::MalformedPacket(
                    "Invalid remaining length encoding".to_string(),
                ));
            }
        }

        let fixed_header = FixedHeader::decode(&mut header_buf)?;

        let mut body = BytesMut::zeroed(fixed_header.remaining_length as usize);
        self.read_exact(&mut body).await?;

        tracing::trace!(
            packet_type = ?fixed_header.packet_type,
            remaining_length = fixed_header.remaining_length,
            "Read packet"
        );

        Packet::decode_from_body(&fixed_header, &mut body)
    }
}

impl<W: AsyncWrite + Unpin + Send> PacketWriter for W {
    async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let mut buf = BytesMut::with_capacity(128);
        packet.encode(&mut buf)?;

        self.write_all(&buf).await?;
        self.flush().await?;

        tracing::trace!(packet_type = ?packet.packet_type(), len = buf.len(), "Wrote packet");
        Ok(())
    }
}
