//! Transfers by id

use crate::error::TransferError;
use crate::transfer::Transfer;
use mesh_wire::TransferId;
use std::collections::HashMap;

/// Owns every known transfer. One registry per engine.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    transfers: HashMap<TransferId, Transfer>,
}

impl TransferRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new transfer. An existing transfer with the same id is kept.
    pub fn insert(&mut self, transfer: Transfer) -> Result<(), TransferError> {
        if self.transfers.contains_key(&transfer.id) {
            return Err(TransferError::DuplicateOffer(transfer.id));
        }
        self.transfers.insert(transfer.id.clone(), transfer);
        Ok(())
    }

    /// Look up a transfer
    pub fn get(&self, id: &TransferId) -> Option<&Transfer> {
        self.transfers.get(id)
    }

    /// Look up a transfer for update
    pub fn get_mut(&mut self, id: &TransferId) -> Option<&mut Transfer> {
        self.transfers.get_mut(id)
    }

    /// Whether `id` is known
    pub fn contains(&self, id: &TransferId) -> bool {
        self.transfers.contains_key(id)
    }

    /// Drop a transfer
    pub fn remove(&mut self, id: &TransferId) -> Option<Transfer> {
        self.transfers.remove(id)
    }

    /// Number of transfers
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    /// Whether no transfer is known
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// All transfers, unordered
    pub fn iter(&self) -> impl Iterator<Item = &Transfer> {
        self.transfers.values()
    }
}
