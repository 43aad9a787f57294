//! File-transfer error types.

use crate::transfer::TransferStatus;
use crate::transport::TransportError;
use mesh_wire::{TransferId, WireError};
use thiserror::Error;

/// File-transfer errors.
///
/// Inbound handlers never return these; they log them and carry on. Local
/// initiator operations return the lookup and state variants to the caller.
#[derive(Error, Debug)]
pub enum TransferError {
    /// No transfer with this id
    #[error("transfer {0} not found")]
    TransferNotFound(TransferId),

    /// A transfer with this id already exists
    #[error("duplicate offer for transfer {0}")]
    DuplicateOffer(TransferId),

    /// Outbound send failed
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Reassembly found a gap
    #[error("missing chunk {index}")]
    MissingChunk {
        /// First missing part index
        index: u32,
    },

    /// Control message could not be encoded or is too large
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// A requested part cannot be produced
    #[error("part {index} unavailable: {reason}")]
    PartUnavailable {
        /// Requested part index
        index: u32,
        /// Why the part cannot be produced
        reason: &'static str,
    },

    /// Operation not valid for the transfer's direction or status
    #[error("transfer {id} is {status}, cannot {action}")]
    InvalidState {
        /// Transfer id
        id: TransferId,
        /// Current status
        status: TransferStatus,
        /// Attempted operation
        action: &'static str,
    },

    /// Part size of zero
    #[error("invalid part size {0}")]
    InvalidPartSize(u32),

    /// Nothing to send
    #[error("refusing to offer an empty file")]
    EmptyPayload,
}
