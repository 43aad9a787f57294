//! Routing-ack correlation.
//!
//! The correlator keeps no table of outstanding requests. Every ack seen on
//! the routing port is pushed to the registered listeners and then recorded
//! in the message store. Request ids are reused by the radio over time, so
//! listeners must ignore acks for requests they no longer care about.

use crate::listener::{ListenerId, ListenerSet};
use mesh_storage::MessageStore;
use mesh_wire::NodeId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ack observed on the routing port
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckEvent {
    /// Packet id being acknowledged
    pub request_id: u32,
    /// Node that sent the ack
    pub acked_by: NodeId,
    /// Hops the ack travelled, when known
    pub hops_away: Option<u32>,
}

/// Receives routing acks
pub trait AckListener: Send + Sync {
    /// Called once per observed ack
    fn on_ack(&self, event: &AckEvent);
}

impl<F> AckListener for F
where
    F: Fn(&AckEvent) + Send + Sync,
{
    fn on_ack(&self, event: &AckEvent) {
        self(event)
    }
}

/// Forwards acks to listeners and the message store
pub struct AckCorrelator {
    listeners: ListenerSet<dyn AckListener>,
    store: Arc<dyn MessageStore>,
}

impl AckCorrelator {
    /// Create a correlator persisting into `store`
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            listeners: ListenerSet::new(),
            store,
        }
    }

    /// Register an ack listener
    pub fn add_listener(&mut self, listener: Arc<dyn AckListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Unregister an ack listener
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Message store acks are recorded in
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Handle an ack for `request_id` from `acked_by`.
    /// Returns whether a stored message was marked. Store failures are logged, not returned.
    pub async fn on_ack(&self, request_id: u32, acked_by: NodeId, hops_away: Option<u32>) -> bool {
        debug!("Got ack for request id {} from {}", request_id, acked_by);

        let event = AckEvent {
            request_id,
            acked_by,
            hops_away,
        };
        for listener in self.listeners.iter() {
            listener.on_ack(&event);
        }

        match self.store.set_acked_by(request_id, acked_by).await {
            Ok(matched) => {
                if !matched {
                    debug!("Ack for request id {} matched no stored message", request_id);
                }
                matched
            }
            Err(e) => {
                warn!("Failed to record ack for request id {}: {}", request_id, e);
                false
            }
        }
    }
}
