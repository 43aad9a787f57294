//! Channel-backed event notifier.
//!
//! Bridges the synchronous listener callbacks to async consumers: every
//! event is pushed onto an unbounded tokio channel.

use crate::engine::{TransferEvent, TransferListener};
use mesh_events::{AckEvent, AckListener, MeshPacketListener};
use mesh_wire::MeshPacket;
use tokio::sync::mpsc;
use tracing::{error, trace};

/// Any event raised by the dispatcher or the engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// Raw packet seen
    Packet(MeshPacket),
    /// Routing ack seen
    Ack(AckEvent),
    /// Transfer changed
    Transfer(TransferEvent),
}

impl EngineEvent {
    fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Packet(_) => "packet",
            EngineEvent::Ack(_) => "ack",
            EngineEvent::Transfer(_) => "transfer",
        }
    }
}

/// Forwards events to an mpsc channel
#[derive(Debug, Clone)]
pub struct EventNotifier {
    event_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventNotifier {
    /// Create a notifier sending into `event_tx`
    pub fn new(event_tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { event_tx }
    }

    /// Create a notifier together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self::new(event_tx), event_rx)
    }

    fn send_event(&self, event: EngineEvent) {
        let kind = event.kind();
        if let Err(e) = self.event_tx.send(event) {
            error!("Failed to send {} event: {}", kind, e);
        } else {
            trace!("Sent {} event", kind);
        }
    }
}

impl AckListener for EventNotifier {
    fn on_ack(&self, event: &AckEvent) {
        self.send_event(EngineEvent::Ack(*event));
    }
}

impl MeshPacketListener for EventNotifier {
    fn on_mesh_packet(&self, packet: &MeshPacket) {
        self.send_event(EngineEvent::Packet(packet.clone()));
    }
}

impl TransferListener for EventNotifier {
    fn on_transfer_event(&self, event: &TransferEvent) {
        self.send_event(EngineEvent::Transfer(event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_wire::{NodeId, TransferId};

    #[tokio::test]
    async fn test_events_forwarded_in_order() {
        let (notifier, mut events) = EventNotifier::channel();

        let ack = AckEvent {
            request_id: 3,
            acked_by: NodeId(2),
            hops_away: None,
        };
        notifier.on_ack(&ack);
        notifier.on_transfer_event(&TransferEvent::Removed(TransferId::from("t1")));

        assert_eq!(events.recv().await, Some(EngineEvent::Ack(ack)));
        assert_eq!(
            events.recv().await,
            Some(EngineEvent::Transfer(TransferEvent::Removed(TransferId::from("t1"))))
        );
    }

    #[tokio::test]
    async fn test_closed_channel_does_not_panic() {
        let (notifier, events) = EventNotifier::channel();
        drop(events);

        notifier.on_transfer_event(&TransferEvent::Removed(TransferId::from("t1")));
    }
}
