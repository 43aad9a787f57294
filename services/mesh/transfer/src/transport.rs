//! Outbound send seam.
//!
//! The engine only ever asks a [`Transport`] to deliver an encoded control
//! message to one node. Radio framing, acks and retries live behind it.

use async_trait::async_trait;
use bytes::Bytes;
use mesh_wire::NodeId;
use thiserror::Error;

/// Transport failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No link to the radio
    #[error("not connected")]
    Disconnected,

    /// The radio refused or dropped the packet
    #[error("send rejected: {0}")]
    Rejected(String),
}

/// Delivers encoded control messages to a node
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `payload` to `destination` on the private port
    async fn send(&self, destination: NodeId, payload: Bytes) -> Result<(), TransportError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use mesh_wire::{decode, ControlMessage};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every send and decodes it back; can be told to fail sends
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<(NodeId, ControlMessage)>>,
        fail_parts: Mutex<HashSet<u32>>,
        fail_all: Mutex<bool>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_part(&self, index: u32) {
            self.fail_parts.lock().unwrap().insert(index);
        }

        pub fn fail_all(&self, fail: bool) {
            *self.fail_all.lock().unwrap() = fail;
        }

        pub fn sent(&self) -> Vec<(NodeId, ControlMessage)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn take(&self) -> Vec<(NodeId, ControlMessage)> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }

        pub fn sent_part_indexes(&self) -> Vec<u32> {
            self.sent()
                .into_iter()
                .filter_map(|(_, message)| match message {
                    ControlMessage::FilePart { part_index, .. } => Some(part_index),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, destination: NodeId, payload: Bytes) -> Result<(), TransportError> {
            if *self.fail_all.lock().unwrap() {
                return Err(TransportError::Disconnected);
            }

            let message = decode(&payload).map_err(|e| TransportError::Rejected(e.to_string()))?;
            if let ControlMessage::FilePart { part_index, .. } = &message {
                if self.fail_parts.lock().unwrap().contains(part_index) {
                    return Err(TransportError::Rejected(format!("part {}", part_index)));
                }
            }

            self.sent.lock().unwrap().push((destination, message));
            Ok(())
        }
    }
}
