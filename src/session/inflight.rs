use crate::QoS;
use std::collections::{HashMap, HashSet};

/// Where an outbound `QoS` 1/2 publish is in its acknowledgement flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutboundState {
    AwaitingPubAck,
    AwaitingPubRec,
    AwaitingPubComp,
}

/// Packet identifiers still awaiting part of a `QoS` handshake on the
/// current link
#[derive(Debug, Default)]
pub(crate) struct InflightTracker {
    outbound: HashMap<u16, OutboundState>,
    inbound_qos2: HashSet<u16>,
}

impl InflightTracker {
    pub(crate) fn contains(&self, packet_id: u16) -> bool {
        self.outbound.contains_key(&packet_id)
    }

    pub(crate) fn track_publish(&mut self, packet_id: u16, qos: QoS) {
        let state = match qos {
            QoS::AtMostOnce => return,
            QoS::AtLeastOnce => OutboundState::AwaitingPubAck,
            QoS::ExactlyOnce => OutboundState::AwaitingPubRec,
        };
        self.outbound.insert(packet_id, state);
    }

    pub(crate) fn forget(&mut self, packet_id: u16) {
        self.outbound.remove(&packet_id);
    }

    /// Returns false if no `QoS` 1 publish was waiting on this id
    pub(crate) fn on_puback(&mut self, packet_id: u16) -> bool {
        self.complete(packet_id, OutboundState::AwaitingPubAck)
    }

    /// Moves a `QoS` 2 publish on to wait for PUBCOMP
    pub(crate) fn on_pubrec(&mut self, packet_id: u16) -> bool {
        match self.outbound.get_mut(&packet_id) {
            Some(state @ OutboundState::AwaitingPubRec) => {
                *state = OutboundState::AwaitingPubComp;
                true
            }
            // A resent PUBREC after our PUBREL is still acknowledged
            Some(OutboundState::AwaitingPubComp) => true,
            _ => false,
        }
    }

    pub(crate) fn on_pubcomp(&mut self, packet_id: u16) -> bool {
        self.complete(packet_id, OutboundState::AwaitingPubComp)
    }

    /// Records an inbound `QoS` 2 publish; false if it is a redelivery
    pub(crate) fn begin_inbound(&mut self, packet_id: u16) -> bool {
        self.inbound_qos2.insert(packet_id)
    }

    pub(crate) fn release_inbound(&mut self, packet_id: u16) -> bool {
        self.inbound_qos2.remove(&packet_id)
    }

    pub(crate) fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub(crate) fn clear(&mut self) {
        self.outbound.clear();
        self.inbound_qos2.clear();
    }

    fn complete(&mut self, packet_id: u16, expected: OutboundState) -> bool {
        if self.outbound.get(&packet_id) == Some(&expected) {
            self.outbound.remove(&packet_id);
            true
        } else {
            false
        }
    }
}
