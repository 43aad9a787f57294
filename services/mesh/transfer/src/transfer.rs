//! The transfer entity and its status lifecycle.
//!
//! ```text
//! offering ─▶ accepted ─▶ sending ───▶ complete
//!    │           │    └─▶ receiving ─▶ complete
//!    │           └──────────────────▶ complete   (single-part file)
//!    ├─▶ receiving                               (accepted out of band)
//!    ├─▶ rejected
//!    └─▶ cancelled ◀── any non-terminal status
//! ```
//!
//! `complete`, `rejected` and `cancelled` are terminal. Once reached, the
//! status never changes again.

use crate::assembler::ChunkAssembler;
use bytes::Bytes;
use mesh_wire::{NodeId, TransferId};
use std::fmt;

/// Which side of the transfer this node is on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Another node offered us a file
    Incoming,
    /// We offered a file
    Outgoing,
}

/// Transfer lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    /// Offer sent or received, no answer yet
    Offering,
    /// Part size fixed, no part requested yet
    Accepted,
    /// Sender is serving requested parts
    Sending,
    /// Receiver is collecting parts
    Receiving,
    /// All parts delivered or reassembled
    Complete,
    /// Receiver declined
    Rejected,
    /// Either side abandoned
    Cancelled,
}

impl TransferStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Complete | TransferStatus::Rejected | TransferStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is allowed.
    /// Staying in `sending` or `receiving` is allowed so progress can move.
    pub fn can_advance_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;

        match (*self, next) {
            (Complete | Rejected | Cancelled, _) => false,
            (_, Cancelled) => true,
            (Offering, Accepted | Receiving | Rejected) => true,
            (Accepted, Sending | Receiving | Complete) => true,
            (Sending, Sending | Complete) => true,
            (Receiving, Receiving | Complete) => true,
            _ => false,
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Offering => "offering",
            TransferStatus::Accepted => "accepted",
            TransferStatus::Sending => "sending",
            TransferStatus::Receiving => "receiving",
            TransferStatus::Complete => "complete",
            TransferStatus::Rejected => "rejected",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a transfer, carried in listener events
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferSnapshot {
    /// Transfer id
    pub id: TransferId,
    /// Our side of the transfer
    pub direction: Direction,
    /// Current status
    pub status: TransferStatus,
    /// Percentage in [0, 100]
    pub progress: u8,
}

/// One file transfer between two nodes
#[derive(Debug, Clone)]
pub struct Transfer {
    /// Transfer id chosen by the sender
    pub id: TransferId,
    /// Our side of the transfer
    pub direction: Direction,
    /// Node receiving the file
    pub to: NodeId,
    /// Node sending the file
    pub from: NodeId,
    /// File name from the offer
    pub filename: String,
    /// File size from the offer
    pub filesize: u64,
    status: TransferStatus,
    progress: u8,
    data: Option<Bytes>,
    chunks: ChunkAssembler,
    total_parts: Option<u32>,
    max_acceptable_part_size: Option<u32>,
    blob: Option<Bytes>,
}

impl Transfer {
    /// Transfer created from a received offer
    pub fn incoming(
        id: TransferId,
        from: NodeId,
        to: NodeId,
        filename: impl Into<String>,
        filesize: u64,
    ) -> Self {
        Self::new(id, Direction::Incoming, from, to, filename.into(), filesize, None)
    }

    /// Transfer created when we offer `data`
    pub fn outgoing(
        id: TransferId,
        from: NodeId,
        to: NodeId,
        filename: impl Into<String>,
        data: Bytes,
    ) -> Self {
        let filesize = data.len() as u64;
        Self::new(id, Direction::Outgoing, from, to, filename.into(), filesize, Some(data))
    }

    fn new(
        id: TransferId,
        direction: Direction,
        from: NodeId,
        to: NodeId,
        filename: String,
        filesize: u64,
        data: Option<Bytes>,
    ) -> Self {
        Self {
            id,
            direction,
            to,
            from,
            filename,
            filesize,
            status: TransferStatus::Offering,
            progress: 0,
            data,
            chunks: ChunkAssembler::new(),
            total_parts: None,
            max_acceptable_part_size: None,
            blob: None,
        }
    }

    /// Current status
    pub fn status(&self) -> TransferStatus {
        self.status
    }

    /// Percentage in [0, 100]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// The node at the other end
    pub fn peer(&self) -> NodeId {
        match self.direction {
            Direction::Incoming => self.from,
            Direction::Outgoing => self.to,
        }
    }

    /// Outgoing payload
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Received parts
    pub fn chunks(&self) -> &ChunkAssembler {
        &self.chunks
    }

    /// Part count, once known
    pub fn total_parts(&self) -> Option<u32> {
        self.total_parts
    }

    /// Negotiated part size, once accepted
    pub fn max_acceptable_part_size(&self) -> Option<u32> {
        self.max_acceptable_part_size
    }

    /// Reassembled file, once complete
    pub fn blob(&self) -> Option<&Bytes> {
        self.blob.as_ref()
    }

    /// Move to `next` if the lifecycle allows it. Returns whether it did.
    pub fn advance(&mut self, next: TransferStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// Set progress, clamped to 100
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    /// Fix part size and part count
    pub fn set_part_layout(&mut self, part_size: u32, total_parts: u32) {
        self.max_acceptable_part_size = Some(part_size);
        self.total_parts = Some(total_parts);
    }

    /// Record the part size we accepted for an incoming transfer
    pub fn set_max_acceptable_part_size(&mut self, part_size: u32) {
        self.max_acceptable_part_size = Some(part_size);
    }

    /// Record the part count announced by the sender
    pub fn set_total_parts(&mut self, total_parts: u32) {
        self.total_parts = Some(total_parts);
    }

    /// Mutable access to received parts
    pub fn chunks_mut(&mut self) -> &mut ChunkAssembler {
        &mut self.chunks
    }

    /// Store the reassembled file
    pub fn set_blob(&mut self, blob: Bytes) {
        self.blob = Some(blob);
    }

    /// Point-in-time view
    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            id: self.id.clone(),
            direction: self.direction,
            status: self.status,
            progress: self.progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransferStatus::*;

    const ALL: [TransferStatus; 7] = [Offering, Accepted, Sending, Receiving, Complete, Rejected, Cancelled];

    #[test]
    fn test_terminal_is_sticky() {
        for terminal in [Complete, Rejected, Cancelled] {
            for next in ALL {
                assert!(!terminal.can_advance_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_no_way_back_to_offering() {
        for from in ALL {
            assert!(!from.can_advance_to(Offering));
        }
    }

    #[test]
    fn test_happy_paths() {
        assert!(Offering.can_advance_to(Accepted));
        assert!(Accepted.can_advance_to(Sending));
        assert!(Sending.can_advance_to(Complete));
        assert!(Accepted.can_advance_to(Receiving));
        assert!(Receiving.can_advance_to(Complete));
        assert!(Offering.can_advance_to(Rejected));
    }

    #[test]
    fn test_cannot_reject_after_accept() {
        assert!(!Accepted.can_advance_to(Rejected));
        assert!(!Sending.can_advance_to(Rejected));
    }

    #[test]
    fn test_advance_and_progress() {
        let mut transfer = Transfer::outgoing(
            TransferId::from("t1"),
            NodeId(1),
            NodeId(2),
            "a.txt",
            Bytes::from_static(b"hello"),
        );
        assert_eq!(transfer.status(), Offering);
        assert_eq!(transfer.filesize, 5);
        assert_eq!(transfer.peer(), NodeId(2));

        assert!(transfer.advance(Cancelled));
        assert!(!transfer.advance(Accepted));
        assert_eq!(transfer.status(), Cancelled);

        transfer.set_progress(250);
        assert_eq!(transfer.progress(), 100);
    }

    #[test]
    fn test_incoming_peer_is_sender() {
        let transfer = Transfer::incoming(TransferId::from("t1"), NodeId(1), NodeId(2), "a.txt", 5);
        assert_eq!(transfer.direction, Direction::Incoming);
        assert_eq!(transfer.peer(), NodeId(1));
        assert!(transfer.data().is_none());
    }
}
