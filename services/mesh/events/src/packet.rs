//! Raw mesh packet listeners

use mesh_wire::MeshPacket;

/// Receives every mesh packet before it is dispatched
pub trait MeshPacketListener: Send + Sync {
    /// Called once per received packet
    fn on_mesh_packet(&self, packet: &MeshPacket);
}

impl<F> MeshPacketListener for F
where
    F: Fn(&MeshPacket) + Send + Sync,
{
    fn on_mesh_packet(&self, packet: &MeshPacket) {
        self(packet)
    }
}
