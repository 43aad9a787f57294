//! Message persistence for mesh: ack bookkeeping with pluggable backends.
//!
//! This crate provides the persistence sink used by the ack correlator. Chat
//! messages are inserted when sent or received, and routing acks later mark
//! them as acknowledged by a node. Backends are in-memory (dev/tests) and an
//! append-only file journal.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;

use async_trait::async_trait;
use mesh_wire::NodeId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// How a message was addressed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Sent to a single node
    Direct,
    /// Sent to a channel
    Broadcast,
}

/// Persisted chat message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Packet id, reused as the ack request id
    pub id: u32,
    /// Sending node
    pub from: NodeId,
    /// Destination node
    pub to: NodeId,
    /// Direct or broadcast
    pub kind: MessageKind,
    /// Message text
    pub text: String,
    /// Node that acknowledged the message
    pub acked_by: Option<NodeId>,
    /// Routing error reported for the message
    pub error: Option<String>,
    /// Receive (or send) time, unix seconds
    pub rx_time: u64,
}

impl StoredMessage {
    /// Create an unacknowledged message stamped with the current time
    pub fn new(id: u32, from: NodeId, to: NodeId, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            id,
            from,
            to,
            kind,
            text: text.into(),
            acked_by: None,
            error: None,
            rx_time: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Received from another node
    pub fn is_inbound(&self, local: NodeId) -> bool {
        self.from != local
    }

    /// Sent by us
    pub fn is_outbound(&self, local: NodeId) -> bool {
        self.from == local
    }

    /// Acked by our own node. Broadcasts are implicitly acked this way.
    pub fn is_acknowledged(&self, local: NodeId) -> bool {
        self.acked_by == Some(local)
    }

    /// Direct message acked by its recipient
    pub fn is_delivered(&self) -> bool {
        self.kind == MessageKind::Direct && self.acked_by == Some(self.to)
    }

    /// Routing reported an error
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence sink for messages and their acknowledgments
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a message, replacing any earlier record with the same id
    async fn insert(&self, message: StoredMessage) -> Result<(), StorageError>;

    /// Record that `request_id` was acked by `node`. Returns whether a message matched.
    async fn set_acked_by(&self, request_id: u32, node: NodeId) -> Result<bool, StorageError>;

    /// Look up a message by id
    async fn get(&self, id: u32) -> Result<Option<StoredMessage>, StorageError>;

    /// All messages ordered by id
    async fn list(&self) -> Result<Vec<StoredMessage>, StorageError>;
}

/// Storage backend configuration
#[derive(Clone, Debug, Default)]
pub enum StorageMode {
    /// In-memory storage (dev/tests only)
    #[default]
    InMemory,
    /// Append-only journal on disk
    File {
        /// Data directory path
        data_dir: PathBuf,
        /// Fsync frequency (1 = every write, N = every N writes)
        fsync_every: u32,
    },
}

// Re-export backend implementations
pub use backend::file::{FileStore, FileStoreConfig};
pub use backend::mem::MemoryStore;

/// Open a store for the configured mode
pub async fn open_store(mode: StorageMode) -> Result<Arc<dyn MessageStore>, StorageError> {
    match mode {
        StorageMode::InMemory => Ok(Arc::new(MemoryStore::new())),
        StorageMode::File {
            data_dir,
            fsync_every,
        } => {
            let config = FileStoreConfig {
                data_dir,
                fsync_every,
            };
            Ok(Arc::new(FileStore::open(config).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: NodeId = NodeId(0x10);
    const REMOTE: NodeId = NodeId(0x20);

    #[test]
    fn test_direction_predicates() {
        let outbound = StoredMessage::new(1, LOCAL, REMOTE, MessageKind::Direct, "hi");
        assert!(outbound.is_outbound(LOCAL));
        assert!(!outbound.is_inbound(LOCAL));

        let inbound = StoredMessage::new(2, REMOTE, LOCAL, MessageKind::Direct, "hey");
        assert!(inbound.is_inbound(LOCAL));
        assert!(!inbound.is_outbound(LOCAL));
    }

    #[test]
    fn test_delivery_predicates() {
        let mut direct = StoredMessage::new(1, LOCAL, REMOTE, MessageKind::Direct, "hi");
        assert!(!direct.is_delivered());

        // A relay ack from our own radio is not delivery
        direct.acked_by = Some(LOCAL);
        assert!(direct.is_acknowledged(LOCAL));
        assert!(!direct.is_delivered());

        direct.acked_by = Some(REMOTE);
        assert!(direct.is_delivered());
        assert!(!direct.is_acknowledged(LOCAL));

        let mut broadcast =
            StoredMessage::new(2, LOCAL, NodeId::BROADCAST, MessageKind::Broadcast, "all");
        broadcast.acked_by = Some(LOCAL);
        assert!(broadcast.is_acknowledged(LOCAL));
        assert!(!broadcast.is_delivered());
    }

    #[test]
    fn test_failed() {
        let mut message = StoredMessage::new(1, LOCAL, REMOTE, MessageKind::Direct, "hi");
        assert!(!message.is_failed());
        message.error = Some("MAX_RETRANSMIT".to_string());
        assert!(message.is_failed());
    }

    #[tokio::test]
    async fn test_open_in_memory() {
        let store = open_store(StorageMode::InMemory).await.unwrap();
        store
            .insert(StoredMessage::new(7, LOCAL, REMOTE, MessageKind::Direct, "x"))
            .await
            .unwrap();
        assert!(store.get(7).await.unwrap().is_some());
    }
}
