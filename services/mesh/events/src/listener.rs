//! Removable listener registrations

use std::fmt;
use std::sync::Arc;

/// Handle returned when a listener is registered
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Ordered set of listeners of one kind. Listeners run in registration order.
pub struct ListenerSet<L: ?Sized> {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<L>)>,
}

impl<L: ?Sized> ListenerSet<L> {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            next_id: 1,
            listeners: Vec::new(),
        }
    }

    /// Register a listener
    pub fn add(&mut self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Unregister a listener. Returns false if `id` was not registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Registered listeners in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<L>> {
        self.listeners.iter().map(|(_, listener)| listener)
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for ListenerSet<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.listeners.len())
            .finish()
    }
}
