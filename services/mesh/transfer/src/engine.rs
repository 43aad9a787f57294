//! File-transfer engine.
//!
//! Owns the transfer registry and drives every transfer through its
//! lifecycle in response to inbound control messages and local commands.
//! Handlers take `&mut self`, so messages for the same engine are processed
//! one at a time; a shell that receives packets concurrently wraps the engine
//! in a `tokio::sync::Mutex`.
//!
//! Inbound handlers never fail. Unknown ids, malformed parts and messages
//! that do not fit the transfer's status are logged and dropped. Sends are
//! best effort and a failed send never rolls back state.

use crate::assembler::ChunkAssembler;
use crate::error::TransferError;
use crate::registry::TransferRegistry;
use crate::sender::{PartSender, SendOutcome};
use crate::transfer::{Direction, Transfer, TransferSnapshot, TransferStatus};
use crate::transport::Transport;
use bytes::Bytes;
use mesh_events::{ListenerId, ListenerSet};
use mesh_wire::{progress_percent, total_parts, ControlMessage, NodeId, TransferId, MAX_PAYLOAD_LEN};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Transfer change pushed to listeners
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferEvent {
    /// Transfer created, or its status or progress changed
    Updated(TransferSnapshot),
    /// Transfer dropped from the registry
    Removed(TransferId),
}

/// Receives transfer changes
pub trait TransferListener: Send + Sync {
    /// Called after each handler that changed a transfer
    fn on_transfer_event(&self, event: &TransferEvent);
}

impl<F> TransferListener for F
where
    F: Fn(&TransferEvent) + Send + Sync,
{
    fn on_transfer_event(&self, event: &TransferEvent) {
        self(event)
    }
}

/// Engine settings
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Largest encoded control message the radio accepts
    pub max_payload_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_payload_len: MAX_PAYLOAD_LEN,
        }
    }
}

/// Counters since the engine was created
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// File parts handed to the transport
    pub parts_sent: u64,
    /// Sends of any kind that failed
    pub send_failures: u64,
    /// File parts received, duplicates included
    pub parts_received: u64,
    /// Received parts whose index was already stored
    pub duplicate_parts: u64,
    /// Transfers that reached `complete` on this node
    pub transfers_completed: u64,
}

impl EngineStats {
    fn record_send(&mut self, outcome: &SendOutcome) {
        if !outcome.is_sent() {
            self.send_failures += 1;
        }
    }

    fn record_part(&mut self, outcome: &SendOutcome) {
        if outcome.is_sent() {
            self.parts_sent += 1;
        } else {
            self.send_failures += 1;
        }
    }
}

/// Drives file transfers for one local node
pub struct FileTransferEngine {
    local_node: NodeId,
    registry: TransferRegistry,
    sender: PartSender,
    listeners: ListenerSet<dyn TransferListener>,
    stats: EngineStats,
}

impl FileTransferEngine {
    /// Create an engine for `local_node` sending through `transport`
    pub fn new(local_node: NodeId, transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        Self {
            local_node,
            registry: TransferRegistry::new(),
            sender: PartSender::new(transport, config.max_payload_len),
            listeners: ListenerSet::new(),
            stats: EngineStats::default(),
        }
    }

    /// Node this engine acts for
    pub fn local_node(&self) -> NodeId {
        self.local_node
    }

    /// Look up a transfer
    pub fn transfer(&self, id: &TransferId) -> Option<&Transfer> {
        self.registry.get(id)
    }

    /// All known transfers
    pub fn transfers(&self) -> impl Iterator<Item = &Transfer> {
        self.registry.iter()
    }

    /// Counters since creation
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Register a transfer listener
    pub fn add_listener(&mut self, listener: Arc<dyn TransferListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Unregister a transfer listener
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Handle one decoded control message carried from `from` to `to`
    pub async fn handle_message(&mut self, from: NodeId, to: NodeId, message: ControlMessage) {
        let Some(id) = message.transfer_id().cloned() else {
            debug!("Ignoring {} message from {}", message.kind(), from);
            return;
        };
        let before = self.snapshot(&id);

        match message {
            ControlMessage::Offer {
                id,
                file_name,
                file_size,
            } => self.on_offer(from, to, id, file_name, file_size),
            ControlMessage::Accept {
                max_acceptable_part_size,
                ..
            } => self.on_accept(&id, max_acceptable_part_size).await,
            ControlMessage::Reject { .. } => self.on_reject(&id),
            ControlMessage::Cancel { .. } => self.on_cancel(&id),
            ControlMessage::Completed { .. } => self.on_completed(&id),
            ControlMessage::FilePart {
                part_index,
                total_parts,
                data,
                ..
            } => self.on_file_part(&id, part_index, total_parts, data).await,
            ControlMessage::RequestParts { part_indexes, .. } => {
                self.on_request_parts(&id, &part_indexes).await
            }
            // Carries no transfer id, filtered above
            ControlMessage::Unknown => {}
        }

        self.emit_change(&id, before);
    }

    fn on_offer(&mut self, from: NodeId, to: NodeId, id: TransferId, file_name: String, file_size: u64) {
        info!("Offer {} from {}: {} ({} bytes)", id, from, file_name, file_size);

        let transfer = Transfer::incoming(id, from, to, file_name, file_size);
        if let Err(e) = self.registry.insert(transfer) {
            debug!("Ignoring offer: {}", e);
        }
    }

    async fn on_accept(&mut self, id: &TransferId, requested_part_size: u32) {
        let part_size = requested_part_size.min(self.sender.max_part_size(id));
        let Some(transfer) = self.registry.get_mut(id) else {
            debug!("Accept for unknown transfer {}", id);
            return;
        };
        if transfer.direction != Direction::Outgoing {
            warn!("Accept for incoming transfer {}, ignoring", id);
            return;
        }
        match transfer.status() {
            TransferStatus::Offering => {}
            TransferStatus::Accepted => debug!("Duplicate accept for transfer {}, resending part 0", id),
            status => {
                debug!("Accept for transfer {} while {}, ignoring", id, status);
                return;
            }
        }
        if part_size == 0 {
            warn!("Accept for transfer {} with unusable part size {}, ignoring", id, requested_part_size);
            return;
        }
        if part_size < requested_part_size {
            debug!(
                "Transfer {} accepted {} byte parts, sending {} to fit the radio",
                id, requested_part_size, part_size
            );
        }

        let payload_len = transfer.data().map_or(0, Bytes::len);
        let total = total_parts(payload_len, part_size);
        transfer.set_part_layout(part_size, total);
        transfer.advance(TransferStatus::Accepted);
        info!("Transfer {} accepted: {} parts of up to {} bytes", id, total, part_size);

        let outcome = self.sender.send_part(transfer, 0).await;
        self.stats.record_part(&outcome);
    }

    fn on_reject(&mut self, id: &TransferId) {
        let Some(transfer) = self.registry.get_mut(id) else {
            debug!("Reject for unknown transfer {}", id);
            return;
        };
        if transfer.advance(TransferStatus::Rejected) {
            info!("Transfer {} rejected by {}", id, transfer.to);
        } else {
            debug!("Reject for transfer {} while {}, ignoring", id, transfer.status());
        }
    }

    fn on_cancel(&mut self, id: &TransferId) {
        self.cancel_local(id);
    }

    fn on_completed(&mut self, id: &TransferId) {
        let Some(transfer) = self.registry.get_mut(id) else {
            debug!("Completed for unknown transfer {}", id);
            return;
        };
        if transfer.advance(TransferStatus::Complete) {
            self.stats.transfers_completed += 1;
            info!("Transfer {} delivered to {}", id, transfer.to);
        } else {
            debug!("Completed for transfer {} while {}, ignoring", id, transfer.status());
        }
    }

    async fn on_file_part(&mut self, id: &TransferId, index: u32, total: u32, data: Bytes) {
        let Some(transfer) = self.registry.get_mut(id) else {
            debug!("Part {} for unknown transfer {}", index, id);
            return;
        };
        if transfer.direction != Direction::Incoming {
            warn!("Part {} for outgoing transfer {}, ignoring", index, id);
            return;
        }
        if total == 0 || index >= total {
            warn!("Malformed part {}/{} for transfer {}, ignoring", index, total, id);
            return;
        }
        if let Some(known) = transfer.total_parts() {
            if known != total {
                warn!(
                    "Part {} for transfer {} claims {} parts, expected {}, ignoring",
                    index, id, total, known
                );
                return;
            }
        }
        if matches!(transfer.status(), TransferStatus::Rejected | TransferStatus::Cancelled) {
            debug!("Part {} for transfer {} while {}, ignoring", index, id, transfer.status());
            return;
        }

        transfer.set_total_parts(total);
        self.stats.parts_received += 1;
        if transfer.chunks_mut().store(index, data) {
            self.stats.duplicate_parts += 1;
            debug!("Duplicate part {} for transfer {}", index, id);
        }

        if transfer.status().is_terminal() {
            return;
        }

        transfer.advance(TransferStatus::Receiving);
        let received = transfer.chunks().received(total);
        transfer.set_progress(progress_percent(received.saturating_sub(1), total));

        if transfer.chunks().has_all(total) {
            match transfer.chunks().finalize(total) {
                Ok(blob) => {
                    let size = blob.len();
                    transfer.set_blob(blob);
                    transfer.advance(TransferStatus::Complete);
                    transfer.set_progress(100);
                    self.stats.transfers_completed += 1;
                    info!("Transfer {} complete: {} ({} bytes)", id, transfer.filename, size);

                    let outcome = self.sender.complete_transfer(transfer).await;
                    self.stats.record_send(&outcome);
                }
                Err(e) => warn!("Failed to reassemble transfer {}: {}", id, e),
            }
            return;
        }

        let wanted: Vec<u32> = if ChunkAssembler::is_final_part(index, total) {
            let missing = transfer.chunks().missing(total);
            let batch = self.sender.request_batch(id, &missing);
            info!(
                "Transfer {} got its last part with {} missing, requesting {:?}",
                id,
                missing.len(),
                batch
            );
            batch.to_vec()
        } else {
            transfer.chunks().next_missing_after(index, total).into_iter().collect()
        };
        if wanted.is_empty() {
            return;
        }

        let outcome = self.sender.request_parts(transfer, &wanted).await;
        self.stats.record_send(&outcome);
    }

    async fn on_request_parts(&mut self, id: &TransferId, indexes: &[u32]) {
        let Some(transfer) = self.registry.get_mut(id) else {
            debug!("Part request for unknown transfer {}", id);
            return;
        };
        if transfer.direction != Direction::Outgoing {
            warn!("Part request for incoming transfer {}, ignoring", id);
            return;
        }
        match transfer.status() {
            TransferStatus::Offering => {
                warn!("Part request for transfer {} before accept, ignoring", id);
                return;
            }
            status if status.is_terminal() => {
                debug!("Part request for transfer {} while {}, ignoring", id, status);
                return;
            }
            _ => {}
        }

        let Some(total) = transfer.total_parts() else {
            warn!("Part request for transfer {} with no part layout, ignoring", id);
            return;
        };
        for &index in indexes {
            if index >= total {
                warn!("Transfer {} has {} parts, skipping requested part {}", id, total, index);
                continue;
            }
            let outcome = self.sender.send_part(transfer, index).await;
            self.stats.record_part(&outcome);

            transfer.advance(TransferStatus::Sending);
            transfer.set_progress(progress_percent(index, total));
        }
    }

    /// Offer `data` to `to`. The transfer stays in `offering` until the
    /// receiver answers.
    pub async fn offer_file(
        &mut self,
        to: NodeId,
        file_name: impl Into<String>,
        data: Bytes,
    ) -> Result<TransferId, TransferError> {
        if data.is_empty() {
            return Err(TransferError::EmptyPayload);
        }

        let id = TransferId::generate();
        let transfer = Transfer::outgoing(id.clone(), self.local_node, to, file_name, data);
        let message = ControlMessage::Offer {
            id: id.clone(),
            file_name: transfer.filename.clone(),
            file_size: transfer.filesize,
        };
        info!("Offering {} ({} bytes) to {} as {}", transfer.filename, transfer.filesize, to, id);
        self.registry.insert(transfer)?;

        let outcome = self.sender.send_message(to, &message).await;
        self.stats.record_send(&outcome);

        self.emit_change(&id, None);
        Ok(id)
    }

    /// Accept an incoming offer with parts of at most `max_part_size` bytes
    /// The part size is capped so that every part fits in one radio packet.
    pub async fn accept(&mut self, id: &TransferId, max_part_size: u32) -> Result<(), TransferError> {
        let part_size = max_part_size.min(self.sender.max_part_size(id));
        if part_size == 0 {
            return Err(TransferError::InvalidPartSize(max_part_size));
        }
        let before = self.snapshot(id);
        let transfer = Self::pending_incoming(&mut self.registry, id, "accept")?;

        let message = ControlMessage::Accept {
            file_transfer_id: id.clone(),
            max_acceptable_part_size: part_size,
        };
        let outcome = self.sender.send_message(transfer.from, &message).await;
        self.stats.record_send(&outcome);

        transfer.set_max_acceptable_part_size(part_size);
        transfer.advance(TransferStatus::Accepted);
        info!("Accepted transfer {} with parts of up to {} bytes", id, part_size);

        self.emit_change(id, before);
        Ok(())
    }

    /// Decline an incoming offer
    pub async fn reject(&mut self, id: &TransferId) -> Result<(), TransferError> {
        let before = self.snapshot(id);
        let transfer = Self::pending_incoming(&mut self.registry, id, "reject")?;

        let message = ControlMessage::Reject {
            file_transfer_id: id.clone(),
        };
        let outcome = self.sender.send_message(transfer.from, &message).await;
        self.stats.record_send(&outcome);

        transfer.advance(TransferStatus::Rejected);
        info!("Rejected transfer {}", id);

        self.emit_change(id, before);
        Ok(())
    }

    /// Abandon a transfer in either direction and tell the peer
    pub async fn cancel(&mut self, id: &TransferId) -> Result<(), TransferError> {
        let before = self.snapshot(id);
        let transfer = self
            .registry
            .get(id)
            .ok_or_else(|| TransferError::TransferNotFound(id.clone()))?;
        if transfer.status().is_terminal() {
            return Err(TransferError::InvalidState {
                id: id.clone(),
                status: transfer.status(),
                action: "cancel",
            });
        }

        let message = ControlMessage::Cancel {
            file_transfer_id: id.clone(),
        };
        let outcome = self.sender.send_message(transfer.peer(), &message).await;
        self.stats.record_send(&outcome);

        self.cancel_local(id);
        self.emit_change(id, before);
        Ok(())
    }

    /// Ask the sender for the parts not yet received, as many as fit in one
    /// packet, lowest index first. Returns the requested indexes.
    ///
    /// Until the first part arrives the part count is unknown, and the
    /// sender may never have seen our Accept. In that case the Accept is sent
    /// again, which makes the sender (re)send part 0.
    pub async fn request_missing_parts(&mut self, id: &TransferId) -> Result<Vec<u32>, TransferError> {
        let transfer = self
            .registry
            .get(id)
            .ok_or_else(|| TransferError::TransferNotFound(id.clone()))?;
        let retryable = transfer.direction == Direction::Incoming
            && matches!(transfer.status(), TransferStatus::Accepted | TransferStatus::Receiving);
        if !retryable {
            return Err(TransferError::InvalidState {
                id: id.clone(),
                status: transfer.status(),
                action: "request missing parts",
            });
        }

        let Some(total) = transfer.total_parts() else {
            let part_size = transfer.max_acceptable_part_size().unwrap_or(0);
            debug!("No part of transfer {} yet, repeating accept", id);
            let message = ControlMessage::Accept {
                file_transfer_id: id.clone(),
                max_acceptable_part_size: part_size,
            };
            let outcome = self.sender.send_message(transfer.from, &message).await;
            self.stats.record_send(&outcome);
            return Ok(vec![0]);
        };

        let missing = transfer.chunks().missing(total);
        let batch = self.sender.request_batch(id, &missing);
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Re-requesting parts {:?} of transfer {}", batch, id);
        let outcome = self.sender.request_parts(transfer, batch).await;
        self.stats.record_send(&outcome);
        Ok(batch.to_vec())
    }

    fn pending_incoming<'a>(
        registry: &'a mut TransferRegistry,
        id: &TransferId,
        action: &'static str,
    ) -> Result<&'a mut Transfer, TransferError> {
        let transfer = registry
            .get_mut(id)
            .ok_or_else(|| TransferError::TransferNotFound(id.clone()))?;
        if transfer.direction != Direction::Incoming || transfer.status() != TransferStatus::Offering {
            return Err(TransferError::InvalidState {
                id: id.clone(),
                status: transfer.status(),
                action,
            });
        }
        Ok(transfer)
    }

    fn cancel_local(&mut self, id: &TransferId) {
        let Some(status) = self.registry.get(id).map(Transfer::status) else {
            debug!("Cancel for unknown transfer {}", id);
            return;
        };

        if status == TransferStatus::Offering {
            self.registry.remove(id);
            info!("Transfer {} cancelled before accept, removed", id);
        } else if let Some(transfer) = self.registry.get_mut(id) {
            if transfer.advance(TransferStatus::Cancelled) {
                info!("Transfer {} cancelled", id);
            } else {
                debug!("Cancel for transfer {} while {}, ignoring", id, status);
            }
        }
    }

    fn snapshot(&self, id: &TransferId) -> Option<TransferSnapshot> {
        self.registry.get(id).map(Transfer::snapshot)
    }

    fn emit_change(&self, id: &TransferId, before: Option<TransferSnapshot>) {
        let event = match (before, self.snapshot(id)) {
            (None, None) => return,
            (Some(_), None) => TransferEvent::Removed(id.clone()),
            (Some(before), Some(after)) if before == after => return,
            (_, Some(after)) => TransferEvent::Updated(after),
        };

        for listener in self.listeners.iter() {
            listener.on_transfer_event(&event);
        }
    }
}
