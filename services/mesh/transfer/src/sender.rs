//! Builds and sends control messages for a transfer.
//!
//! Every send is best effort. Failures are logged here and handed back as a
//! [`SendOutcome`] so callers can count them, but they never abort the
//! surrounding handler.

use crate::error::TransferError;
use crate::transfer::Transfer;
use crate::transport::Transport;
use mesh_wire::{
    encode_with_limit, max_part_data_len, request_parts_capacity, slice_part, ControlMessage, NodeId, TransferId,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Result of one best-effort send
#[must_use]
#[derive(Debug)]
pub enum SendOutcome {
    /// Handed to the transport
    Sent {
        /// Encoded size in bytes
        bytes: usize,
    },
    /// Not sent
    Failed(TransferError),
}

impl SendOutcome {
    /// Whether the message reached the transport
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

/// Sends transfer control messages through a [`Transport`]
#[derive(Clone)]
pub struct PartSender {
    transport: Arc<dyn Transport>,
    max_payload_len: usize,
}

impl PartSender {
    /// Create a sender that refuses messages larger than `max_payload_len`
    pub fn new(transport: Arc<dyn Transport>, max_payload_len: usize) -> Self {
        Self {
            transport,
            max_payload_len,
        }
    }

    /// Largest part size whose FilePart for `id` still fits in one packet
    pub fn max_part_size(&self, id: &TransferId) -> u32 {
        u32::try_from(max_part_data_len(id, self.max_payload_len)).unwrap_or(u32::MAX)
    }

    /// Leading run of `indexes` that one RequestParts for `id` can carry.
    /// Later indexes are left for the next request.
    pub fn request_batch<'a>(&self, id: &TransferId, indexes: &'a [u32]) -> &'a [u32] {
        let count = request_parts_capacity(id, indexes, self.max_payload_len);
        if count < indexes.len() {
            debug!(
                "Requesting {} of {} parts of transfer {} in this round",
                count,
                indexes.len(),
                id
            );
        }
        &indexes[..count]
    }

    /// Send part `index` of an outgoing transfer to its receiver
    pub async fn send_part(&self, transfer: &Transfer, index: u32) -> SendOutcome {
        let message = match build_part(transfer, index) {
            Ok(message) => message,
            Err(e) => {
                warn!("Not sending part {} of transfer {}: {}", index, transfer.id, e);
                return SendOutcome::Failed(e);
            }
        };

        self.send_message(transfer.to, &message).await
    }

    /// Ask the sender of an incoming transfer for `indexes`
    pub async fn request_parts(&self, transfer: &Transfer, indexes: &[u32]) -> SendOutcome {
        let message = ControlMessage::RequestParts {
            file_transfer_id: transfer.id.clone(),
            part_indexes: indexes.to_vec(),
        };
        self.send_message(transfer.from, &message).await
    }

    /// Tell the sender of an incoming transfer that reassembly finished
    pub async fn complete_transfer(&self, transfer: &Transfer) -> SendOutcome {
        let message = ControlMessage::Completed {
            file_transfer_id: transfer.id.clone(),
        };
        self.send_message(transfer.from, &message).await
    }

    /// Encode `message` and hand it to the transport
    pub async fn send_message(&self, destination: NodeId, message: &ControlMessage) -> SendOutcome {
        let payload = match encode_with_limit(message, self.max_payload_len) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode {} for {}: {}", message.kind(), destination, e);
                return SendOutcome::Failed(e.into());
            }
        };

        let bytes = payload.len();
        match self.transport.send(destination, payload).await {
            Ok(()) => {
                trace!("Sent {} ({} bytes) to {}", message.kind(), bytes, destination);
                SendOutcome::Sent { bytes }
            }
            Err(e) => {
                warn!("Failed to send {} to {}: {}", message.kind(), destination, e);
                SendOutcome::Failed(e.into())
            }
        }
    }
}

fn build_part(transfer: &Transfer, index: u32) -> Result<ControlMessage, TransferError> {
    let part_size = transfer
        .max_acceptable_part_size()
        .ok_or(TransferError::PartUnavailable {
            index,
            reason: "no part size negotiated",
        })?;
    let data = transfer.data().ok_or(TransferError::PartUnavailable {
        index,
        reason: "no outgoing payload",
    })?;
    let part = slice_part(data, index, part_size).ok_or(TransferError::PartUnavailable {
        index,
        reason: "index out of range",
    })?;

    Ok(ControlMessage::FilePart {
        file_transfer_id: transfer.id.clone(),
        part_index: index,
        total_parts: transfer.total_parts().unwrap_or(0),
        data: part,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingTransport;
    use bytes::Bytes;
    use mesh_wire::{TransferId, MAX_PAYLOAD_LEN};

    fn accepted(data: &'static [u8], part_size: u32) -> Transfer {
        let mut transfer = Transfer::outgoing(
            TransferId::from("t1"),
            NodeId(1),
            NodeId(2),
            "a.bin",
            Bytes::from_static(data),
        );
        let total = mesh_wire::total_parts(data.len(), part_size);
        transfer.set_part_layout(part_size, total);
        transfer
    }

    #[tokio::test]
    async fn test_send_part_slices_payload() {
        let transport = Arc::new(RecordingTransport::new());
        let sender = PartSender::new(transport.clone(), MAX_PAYLOAD_LEN);
        let transfer = accepted(b"abcdefg", 3);

        assert!(sender.send_part(&transfer, 2).await.is_sent());

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, NodeId(2));
        assert_eq!(
            sent[0].1,
            ControlMessage::FilePart {
                file_transfer_id: TransferId::from("t1"),
                part_index: 2,
                total_parts: 3,
                data: Bytes::from_static(b"g"),
            }
        );
    }

    #[tokio::test]
    async fn test_part_out_of_range_is_not_sent() {
        let transport = Arc::new(RecordingTransport::new());
        let sender = PartSender::new(transport.clone(), MAX_PAYLOAD_LEN);
        let transfer = accepted(b"abcdefg", 3);

        let outcome = sender.send_part(&transfer, 3).await;
        assert!(matches!(
            outcome,
            SendOutcome::Failed(TransferError::PartUnavailable { index: 3, .. })
        ));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_part_before_accept_is_not_sent() {
        let transport = Arc::new(RecordingTransport::new());
        let sender = PartSender::new(transport.clone(), MAX_PAYLOAD_LEN);
        let transfer = Transfer::outgoing(
            TransferId::from("t1"),
            NodeId(1),
            NodeId(2),
            "a.bin",
            Bytes::from_static(b"abc"),
        );

        assert!(!sender.send_part(&transfer, 0).await.is_sent());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_requests_go_to_sender() {
        let transport = Arc::new(RecordingTransport::new());
        let sender = PartSender::new(transport.clone(), MAX_PAYLOAD_LEN);
        let transfer = Transfer::incoming(TransferId::from("t1"), NodeId(1), NodeId(2), "a.bin", 7);

        assert!(sender.request_parts(&transfer, &[1, 2]).await.is_sent());
        assert!(sender.complete_transfer(&transfer).await.is_sent());

        let sent = transport.sent();
        assert!(sent.iter().all(|(to, _)| *to == NodeId(1)));
        assert_eq!(
            sent[0].1,
            ControlMessage::RequestParts {
                file_transfer_id: TransferId::from("t1"),
                part_indexes: vec![1, 2],
            }
        );
        assert_eq!(
            sent[1].1,
            ControlMessage::Completed {
                file_transfer_id: TransferId::from("t1"),
            }
        );
    }

    #[tokio::test]
    async fn test_oversized_message_refused() {
        let transport = Arc::new(RecordingTransport::new());
        let sender = PartSender::new(transport.clone(), 16);
        let transfer = accepted(b"abcdefghijklmnopqrstuvwxyz", 26);

        let outcome = sender.send_part(&transfer, 0).await;
        assert!(matches!(outcome, SendOutcome::Failed(TransferError::Wire(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_reported() {
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_all(true);
        let sender = PartSender::new(transport.clone(), MAX_PAYLOAD_LEN);
        let transfer = accepted(b"abc", 3);

        let outcome = sender.send_part(&transfer, 0).await;
        assert!(matches!(outcome, SendOutcome::Failed(TransferError::Transport(_))));
    }

    #[test]
    fn test_request_batch_fits_one_packet() {
        let sender = PartSender::new(Arc::new(RecordingTransport::new()), MAX_PAYLOAD_LEN);
        let id = TransferId::generate();

        let few = [1, 2, 3];
        assert_eq!(sender.request_batch(&id, &few), &few);

        let many: Vec<u32> = (0..400).collect();
        let batch = sender.request_batch(&id, &many);
        assert!(!batch.is_empty() && batch.len() < many.len());
        assert_eq!(batch[0], 0);
    }

    #[test]
    fn test_max_part_size_tracks_payload_limit() {
        let id = TransferId::generate();
        let radio = PartSender::new(Arc::new(RecordingTransport::new()), MAX_PAYLOAD_LEN);
        let roomy = PartSender::new(Arc::new(RecordingTransport::new()), 4 * MAX_PAYLOAD_LEN);

        assert!(radio.max_part_size(&id) > 100);
        assert!(radio.max_part_size(&id) < MAX_PAYLOAD_LEN as u32);
        assert!(roomy.max_part_size(&id) > radio.max_part_size(&id));
    }
}
