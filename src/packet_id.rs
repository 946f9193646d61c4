//! Packet identifier allocation for `QoS` 1/2 publishes and subscriptions

use crate::error::{MqttError, Result};
use std::sync::atomic::{AtomicU16, Ordering};

/// Hands out packet identifiers in the range 1..=65535, wrapping back to 1
#[derive(Debug)]
pub struct PacketIdGenerator {
    next_id: AtomicU16,
}

impl PacketIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU16::new(1),
        }
    }

    /// Gets the next packet ID; 0 is never returned
    #[must_use]
    pub fn next(&self) -> u16 {
        loop {
            let current = self.next_id.load(Ordering::SeqCst);
            let next = if current == u16::MAX { 1 } else { current + 1 };

            if self
                .next_id
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return current;
            }
        }
    }

    /// Gets the next packet ID for which `in_use` returns false
    ///
    /// # Errors
    ///
    /// Returns `PacketIdExhausted` when every identifier is still awaiting
    /// acknowledgement
    pub fn next_free(&self, in_use: impl Fn(u16) -> bool) -> Result<u16> {
        for _ in 0..u16::MAX {
            let id = self.next();
            if !in_use(id) {
                return Ok(id);
            }
        }
        Err(MqttError::PacketIdExhausted)
    }
}

impl Default for PacketIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
