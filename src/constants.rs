//! MQTT 3.1.1 protocol constants
//!
//! Named values for the fixed header, CONNECT flags and size limits so the
//! codec modules do not carry magic numbers.

/// Protocol identification carried in the CONNECT variable header
pub mod protocol {
    /// Protocol name, always "MQTT" for 3.1.1
    pub const NAME: &str = "MQTT";

    /// Protocol level for MQTT 3.1.1
    pub const LEVEL_V311: u8 = 4;
}

/// Masks for extracting fields from the fixed header
pub mod masks {
    /// Mask for extracting flags from fixed header byte 1 (0x0F)
    pub const FLAGS: u8 = 0x0F;

    /// Mask for checking continuation bit in variable byte integer (0x80)
    pub const CONTINUATION_BIT: u8 = 0x80;

    /// Mask for extracting value from variable byte integer (0x7F)
    pub const VARIABLE_BYTE_VALUE: u8 = 0x7F;
}

/// Fixed header flag values that are mandated by the protocol
pub mod flags {
    /// PUBREL, SUBSCRIBE and UNSUBSCRIBE carry 0b0010 in the flag nibble
    pub const RESERVED_0010: u8 = 0x02;

    /// PUBLISH DUP flag (bit 3)
    pub const PUBLISH_DUP: u8 = 0x08;

    /// PUBLISH QoS bits (bits 2-1)
    pub const PUBLISH_QOS_MASK: u8 = 0x06;

    /// PUBLISH QoS shift
    pub const PUBLISH_QOS_SHIFT: u8 = 1;

    /// PUBLISH RETAIN flag (bit 0)
    pub const PUBLISH_RETAIN: u8 = 0x01;
}

/// CONNECT variable header flag bits
pub mod connect_flags {
    pub const USERNAME: u8 = 0x80;
    pub const PASSWORD: u8 = 0x40;
    pub const WILL_RETAIN: u8 = 0x20;
    pub const WILL_QOS_MASK: u8 = 0x18;
    pub const WILL_FLAG: u8 = 0x04;
    pub const CLEAN_SESSION: u8 = 0x02;
    pub const RESERVED: u8 = 0x01;
}

/// Size limits
pub mod limits {
    /// Maximum length of an encoded UTF-8 string or binary field
    pub const MAX_STRING_LENGTH: u16 = u16::MAX;

    /// Maximum value of the remaining length field (268,435,455)
    pub const MAX_REMAINING_LENGTH: u32 = 268_435_455;

    /// Maximum number of bytes in the remaining length field
    pub const MAX_REMAINING_LENGTH_BYTES: usize = 4;
}
