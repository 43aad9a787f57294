//! In-memory storage backend for development and testing

use crate::{MessageStore, StorageError, StoredMessage};
use async_trait::async_trait;
use dashmap::DashMap;
use mesh_wire::NodeId;
use std::sync::Arc;
use tracing::debug;

/// In-memory message store
pub struct MemoryStore {
    /// Messages indexed by packet id
    messages: Arc<DashMap<u32, StoredMessage>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            messages: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: StoredMessage) -> Result<(), StorageError> {
        debug!(
            "Store insert id={} from={} to={}",
            message.id, message.from, message.to
        );
        self.messages.insert(message.id, message);
        Ok(())
    }

    async fn set_acked_by(&self, request_id: u32, node: NodeId) -> Result<bool, StorageError> {
        match self.messages.get_mut(&request_id) {
            Some(mut message) => {
                debug!("Store ack id={} acked_by={}", request_id, node);
                message.acked_by = Some(node);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: u32) -> Result<Option<StoredMessage>, StorageError> {
        Ok(self.messages.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<StoredMessage>, StorageError> {
        let mut messages: Vec<StoredMessage> = self
            .messages
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }
}
