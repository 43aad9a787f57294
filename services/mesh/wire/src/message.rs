//! File-transfer control messages carried on the private application port.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque file-transfer identifier
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub String);

impl TransferId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        TransferId(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransferId {
    fn from(value: &str) -> Self {
        TransferId(value.to_string())
    }
}

impl From<String> for TransferId {
    fn from(value: String) -> Self {
        TransferId(value)
    }
}

/// One file-transfer control message. Exactly one variant per packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Sender proposes a file
    Offer {
        /// New transfer id chosen by the sender
        id: TransferId,
        /// File name
        file_name: String,
        /// File size in bytes
        file_size: u64,
    },
    /// Receiver accepts and fixes the part size
    Accept {
        /// Transfer being accepted
        file_transfer_id: TransferId,
        /// Largest part the receiver is willing to take
        max_acceptable_part_size: u32,
    },
    /// Receiver declines the offer
    Reject {
        /// Transfer being rejected
        file_transfer_id: TransferId,
    },
    /// Either side abandons the transfer
    Cancel {
        /// Transfer being cancelled
        file_transfer_id: TransferId,
    },
    /// Receiver has reassembled the file
    Completed {
        /// Transfer that completed
        file_transfer_id: TransferId,
    },
    /// One slice of the file
    FilePart {
        /// Transfer the part belongs to
        file_transfer_id: TransferId,
        /// 0-based part index
        part_index: u32,
        /// Total number of parts
        total_parts: u32,
        /// Part bytes
        data: Bytes,
    },
    /// Receiver pulls specific parts
    RequestParts {
        /// Transfer the parts belong to
        file_transfer_id: TransferId,
        /// Requested part indexes, served in order
        part_indexes: Vec<u32>,
    },
    /// Variant this build does not know; handled as a no-op
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Transfer this message refers to
    pub fn transfer_id(&self) -> Option<&TransferId> {
        match self {
            ControlMessage::Offer { id, .. } => Some(id),
            ControlMessage::Accept { file_transfer_id, .. }
            | ControlMessage::Reject { file_transfer_id }
            | ControlMessage::Cancel { file_transfer_id }
            | ControlMessage::Completed { file_transfer_id }
            | ControlMessage::FilePart { file_transfer_id, .. }
            | ControlMessage::RequestParts { file_transfer_id, .. } => Some(file_transfer_id),
            ControlMessage::Unknown => None,
        }
    }

    /// Short variant name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Offer { .. } => "offer",
            ControlMessage::Accept { .. } => "accept",
            ControlMessage::Reject { .. } => "reject",
            ControlMessage::Cancel { .. } => "cancel",
            ControlMessage::Completed { .. } => "completed",
            ControlMessage::FilePart { .. } => "file_part",
            ControlMessage::RequestParts { .. } => "request_parts",
            ControlMessage::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_id_accessor() {
        let offer = ControlMessage::Offer {
            id: "t1".into(),
            file_name: "a.bin".to_string(),
            file_size: 300,
        };
        assert_eq!(offer.transfer_id(), Some(&TransferId::from("t1")));
        assert_eq!(offer.kind(), "offer");

        let part = ControlMessage::FilePart {
            file_transfer_id: "t2".into(),
            part_index: 0,
            total_parts: 1,
            data: Bytes::from_static(b"x"),
        };
        assert_eq!(part.transfer_id(), Some(&TransferId::from("t2")));
        assert_eq!(ControlMessage::Unknown.transfer_id(), None);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = TransferId::generate();
        let b = TransferId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
