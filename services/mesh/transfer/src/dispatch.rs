//! Routes received mesh packets.
//!
//! Every packet first goes to the raw packet listeners. Decoded packets are
//! then routed by port: routing acks to the ack correlator, text messages
//! to the message store, private-port payloads to the transfer engine.

use crate::engine::FileTransferEngine;
use mesh_events::{AckCorrelator, ListenerId, ListenerSet, MeshPacketListener};
use mesh_storage::{MessageKind, StoredMessage};
use mesh_wire::{decode, MeshPacket, PortNum};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Entry point for packets coming off the radio
pub struct PacketDispatcher {
    engine: FileTransferEngine,
    acks: AckCorrelator,
    packet_listeners: ListenerSet<dyn MeshPacketListener>,
}

impl PacketDispatcher {
    /// Create a dispatcher feeding `engine` and `acks`
    pub fn new(engine: FileTransferEngine, acks: AckCorrelator) -> Self {
        Self {
            engine,
            acks,
            packet_listeners: ListenerSet::new(),
        }
    }

    /// Transfer engine
    pub fn engine(&self) -> &FileTransferEngine {
        &self.engine
    }

    /// Transfer engine, for local commands and listener registration
    pub fn engine_mut(&mut self) -> &mut FileTransferEngine {
        &mut self.engine
    }

    /// Ack correlator
    pub fn acks(&self) -> &AckCorrelator {
        &self.acks
    }

    /// Ack correlator, for listener registration
    pub fn acks_mut(&mut self) -> &mut AckCorrelator {
        &mut self.acks
    }

    /// Register a raw packet listener
    pub fn add_packet_listener(&mut self, listener: Arc<dyn MeshPacketListener>) -> ListenerId {
        self.packet_listeners.add(listener)
    }

    /// Unregister a raw packet listener
    pub fn remove_packet_listener(&mut self, id: ListenerId) -> bool {
        self.packet_listeners.remove(id)
    }

    /// Handle one packet received from the radio
    pub async fn handle_packet(&mut self, packet: &MeshPacket) {
        for listener in self.packet_listeners.iter() {
            listener.on_mesh_packet(packet);
        }

        let Some(data) = packet.data() else {
            trace!("Packet {} from {} is encrypted, skipping", packet.id, packet.from);
            return;
        };

        match data.portnum {
            PortNum::Routing => {
                self.acks
                    .on_ack(data.request_id, packet.from, packet.hops_away())
                    .await;
            }
            PortNum::TextMessage => {
                let kind = if packet.to.is_broadcast() {
                    MessageKind::Broadcast
                } else {
                    MessageKind::Direct
                };
                let text = String::from_utf8_lossy(&data.payload);
                let message = StoredMessage::new(packet.id, packet.from, packet.to, kind, text);
                if let Err(e) = self.acks.store().insert(message).await {
                    warn!("Failed to store message {} from {}: {}", packet.id, packet.from, e);
                }
            }
            PortNum::Private => match decode(&data.payload) {
                Ok(message) => {
                    self.engine
                        .handle_message(packet.from, packet.to, message)
                        .await;
                }
                Err(e) => warn!("Dropping undecodable control message from {}: {}", packet.from, e),
            },
            PortNum::Other(port) => {
                debug!("Ignoring packet {} on port {}", packet.id, port);
            }
        }
    }
}
