//! Decoded mesh packet envelope as handed over by the radio connection.

use crate::node::NodeId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Application port a decoded payload is addressed to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortNum {
    /// Plain text chat message
    TextMessage,
    /// Routing layer (acks, nacks)
    Routing,
    /// Private application payload, carries file-transfer control messages
    Private,
    /// Any other port, preserved as-is
    Other(u32),
}

impl PortNum {
    /// Numeric port as used on the radio
    pub fn as_u32(&self) -> u32 {
        match self {
            PortNum::TextMessage => 1,
            PortNum::Routing => 5,
            PortNum::Private => 256,
            PortNum::Other(n) => *n,
        }
    }
}

impl From<u32> for PortNum {
    fn from(value: u32) -> Self {
        match value {
            1 => PortNum::TextMessage,
            5 => PortNum::Routing,
            256 => PortNum::Private,
            n => PortNum::Other(n),
        }
    }
}

/// Decoded data section of a mesh packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataPayload {
    /// Destination application port
    pub portnum: PortNum,
    /// Application payload
    pub payload: Bytes,
    /// Packet id this payload refers to (routing acks), 0 when unset
    pub request_id: u32,
}

/// Payload section of a mesh packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PacketPayload {
    /// Payload decrypted and decoded by the radio
    Decoded(DataPayload),
    /// Payload we hold no key for
    Encrypted(Bytes),
}

/// Mesh packet as received from the radio
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshPacket {
    /// Packet id assigned by the sender
    pub id: u32,
    /// Sending node
    pub from: NodeId,
    /// Destination node, [`NodeId::BROADCAST`] for broadcasts
    pub to: NodeId,
    /// Hop limit the packet was originally sent with, 0 when unknown
    pub hop_start: u32,
    /// Hops remaining on arrival
    pub hop_limit: u32,
    /// Payload section
    pub payload: PacketPayload,
}

impl MeshPacket {
    /// Create a decoded packet
    pub fn decoded(id: u32, from: NodeId, to: NodeId, portnum: PortNum, payload: Bytes) -> Self {
        Self {
            id,
            from,
            to,
            hop_start: 0,
            hop_limit: 0,
            payload: PacketPayload::Decoded(DataPayload {
                portnum,
                payload,
                request_id: 0,
            }),
        }
    }

    /// Create a routing ack for `request_id`
    pub fn routing_ack(id: u32, from: NodeId, to: NodeId, request_id: u32) -> Self {
        Self {
            id,
            from,
            to,
            hop_start: 0,
            hop_limit: 0,
            payload: PacketPayload::Decoded(DataPayload {
                portnum: PortNum::Routing,
                payload: Bytes::new(),
                request_id,
            }),
        }
    }

    /// Set hop accounting
    pub fn with_hops(mut self, hop_start: u32, hop_limit: u32) -> Self {
        self.hop_start = hop_start;
        self.hop_limit = hop_limit;
        self
    }

    /// Number of hops the packet travelled, if the sender reported its hop start
    pub fn hops_away(&self) -> Option<u32> {
        if self.hop_start == 0 {
            return None;
        }
        self.hop_start.checked_sub(self.hop_limit)
    }

    /// Decoded data section, if any
    pub fn data(&self) -> Option<&DataPayload> {
        match &self.payload {
            PacketPayload::Decoded(data) => Some(data),
            PacketPayload::Encrypted(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_numbers() {
        assert_eq!(PortNum::from(5), PortNum::Routing);
        assert_eq!(PortNum::from(256), PortNum::Private);
        assert_eq!(PortNum::from(67), PortNum::Other(67));
        assert_eq!(PortNum::Other(67).as_u32(), 67);
        assert_eq!(PortNum::TextMessage.as_u32(), 1);
    }

    #[test]
    fn test_hops_away() {
        let packet = MeshPacket::routing_ack(1, NodeId(2), NodeId(3), 99);
        assert_eq!(packet.hops_away(), None);

        let packet = packet.with_hops(3, 1);
        assert_eq!(packet.hops_away(), Some(2));

        // Corrupt accounting never underflows
        let packet = MeshPacket::routing_ack(1, NodeId(2), NodeId(3), 99).with_hops(1, 3);
        assert_eq!(packet.hops_away(), None);
    }

    #[test]
    fn test_encrypted_has_no_data() {
        let packet = MeshPacket {
            id: 7,
            from: NodeId(1),
            to: NodeId(2),
            hop_start: 0,
            hop_limit: 0,
            payload: PacketPayload::Encrypted(Bytes::from_static(b"\x01\x02")),
        };
        assert!(packet.data().is_none());
    }
}
