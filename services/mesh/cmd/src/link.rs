//! In-process radio link between two simulated nodes.
//!
//! Each direction is an unbounded channel feeding the peer's inbox. Packets
//! can be dropped or duplicated at configurable rates; a dropped packet still
//! counts as sent, the way a radio reports success once the frame is on air.

use async_trait::async_trait;
use bytes::Bytes;
use mesh_transfer::{Transport, TransportError};
use mesh_wire::{MeshPacket, NodeId, PortNum};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Hop limit stamped on every simulated packet
const HOP_LIMIT: u32 = 3;

/// Loss and duplication applied to every packet
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkQuality {
    /// Probability in [0, 1] that a packet is dropped
    pub loss_rate: f64,
    /// Probability in [0, 1] that a delivered packet arrives twice
    pub duplicate_rate: f64,
}

/// Per-link counters
#[derive(Debug, Default)]
pub struct LinkStats {
    pub sent: AtomicU64,
    pub dropped: AtomicU64,
    pub duplicated: AtomicU64,
}

/// One direction of the simulated radio
pub struct SimulatedLink {
    local: NodeId,
    peer_inbox: mpsc::UnboundedSender<MeshPacket>,
    quality: LinkQuality,
    next_packet_id: AtomicU32,
    stats: LinkStats,
}

impl SimulatedLink {
    pub fn new(local: NodeId, peer_inbox: mpsc::UnboundedSender<MeshPacket>, quality: LinkQuality) -> Self {
        Self {
            local,
            peer_inbox,
            quality,
            // Offset per node so packet ids from the two ends never collide
            next_packet_id: AtomicU32::new(local.0.wrapping_mul(1000).wrapping_add(1)),
            stats: LinkStats::default(),
        }
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Reserve a packet id, e.g. to record a message before it can be acked
    pub fn next_packet_id(&self) -> u32 {
        self.next_packet_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send `payload` on `portnum` as packet `id`
    pub fn send_packet(&self, id: u32, destination: NodeId, portnum: PortNum, payload: Bytes) -> Result<(), TransportError> {
        let packet = MeshPacket::decoded(id, self.local, destination, portnum, payload).with_hops(HOP_LIMIT, HOP_LIMIT);
        self.transmit(packet)
    }

    /// Send a routing ack for `request_id`
    pub fn send_ack(&self, destination: NodeId, request_id: u32) -> Result<(), TransportError> {
        let id = self.next_packet_id();
        let packet = MeshPacket::routing_ack(id, self.local, destination, request_id).with_hops(HOP_LIMIT, HOP_LIMIT - 1);
        self.transmit(packet)
    }

    fn transmit(&self, packet: MeshPacket) -> Result<(), TransportError> {
        self.stats.sent.fetch_add(1, Ordering::Relaxed);

        if rand::random::<f64>() < self.quality.loss_rate {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Link {} dropped packet {} to {}", self.local, packet.id, packet.to);
            return Ok(());
        }

        let duplicate = rand::random::<f64>() < self.quality.duplicate_rate;
        if duplicate {
            self.stats.duplicated.fetch_add(1, Ordering::Relaxed);
            trace!("Link {} duplicating packet {}", self.local, packet.id);
            self.deliver(packet.clone())?;
        }
        self.deliver(packet)
    }

    fn deliver(&self, packet: MeshPacket) -> Result<(), TransportError> {
        self.peer_inbox
            .send(packet)
            .map_err(|_| TransportError::Disconnected)
    }
}

#[async_trait]
impl Transport for SimulatedLink {
    async fn send(&self, destination: NodeId, payload: Bytes) -> Result<(), TransportError> {
        self.send_packet(self.next_packet_id(), destination, PortNum::Private, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_perfect_link_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = SimulatedLink::new(NodeId(1), tx, LinkQuality::default());

        link.send(NodeId(2), Bytes::from_static(b"abc")).await.unwrap();

        let packet = rx.recv().await.unwrap();
        assert_eq!(packet.from, NodeId(1));
        assert_eq!(packet.to, NodeId(2));
        assert_eq!(packet.data().unwrap().portnum, PortNum::Private);
        assert_eq!(packet.hops_away(), Some(0));
    }

    #[tokio::test]
    async fn test_duplicating_link_delivers_twice() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let quality = LinkQuality {
            loss_rate: 0.0,
            duplicate_rate: 1.0,
        };
        let link = SimulatedLink::new(NodeId(1), tx, quality);

        link.send(NodeId(2), Bytes::from_static(b"abc")).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(link.stats().duplicated.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_closed_inbox_is_disconnected() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let link = SimulatedLink::new(NodeId(1), tx, LinkQuality::default());

        assert_eq!(
            link.send(NodeId(2), Bytes::from_static(b"abc")).await,
            Err(TransportError::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_acks_carry_request_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = SimulatedLink::new(NodeId(1), tx, LinkQuality::default());

        link.send_ack(NodeId(2), 77).unwrap();

        let packet = rx.recv().await.unwrap();
        assert_eq!(packet.data().unwrap().request_id, 77);
        assert_eq!(packet.hops_away(), Some(1));
    }
}
