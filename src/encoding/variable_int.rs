use crate::constants::{limits, masks};
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

/// Maximum value that can be encoded as a remaining length (268,435,455)
pub const VARIABLE_INT_MAX: u32 = limits::MAX_REMAINING_LENGTH;

/// Encodes a remaining length value using 1-4 bytes
///
/// - 0-127: 1 byte
/// - 128-16,383: 2 bytes
/// - 16,384-2,097,151: 3 bytes
/// - 2,097,152-268,435,455: 4 bytes
///
/// # Errors
///
/// Returns `MalformedPacket` if the value exceeds [`VARIABLE_INT_MAX`]
pub fn encode_variable_int<B: BufMut>(buf: &mut B, value: u32) -> Result<()> {
    if value > VARIABLE_INT_MAX {
        return Err(MqttError::MalformedPacket(format!(
            "Remaining length {value} exceeds maximum {VARIABLE_INT_MAX}"
        )));
    }

    let mut val = value;
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            byte |= masks::CONTINUATION_BIT;
        }
        buf.put_u8(byte);
        if val == 0 {
            break;
        }
    }
    Ok(())
}

/// Decodes a remaining length value
///
/// # Errors
///
/// Returns an error if:
/// - The buffer doesn't contain enough bytes
/// - More than 4 bytes are used (protocol violation)
pub fn decode_variable_int<B: Buf>(buf: &mut B) -> Result<u32> {
    let mut value = 0u32;
    let mut multiplier = 1u32;

    for _ in 0..limits::MAX_REMAINING_LENGTH_BYTES {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "Insufficient bytes for variable integer".to_string(),
            ));
        }

        let byte = buf.get_u8();
        value += u32::from(byte & masks::VARIABLE_BYTE_VALUE) * multiplier;

        if byte & masks::CONTINUATION_BIT == 0 {
            return Ok(value);
        }
        multiplier *= 128;
    }

    Err(MqttError::MalformedPacket(
        "Variable integer exceeds 4 bytes".to_string(),
    ))
}

/// Returns the number of bytes needed to encode `value`
#[must_use]
pub fn encoded_variable_int_len(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}
