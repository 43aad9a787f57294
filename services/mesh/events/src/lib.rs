//! Listener registration and routing-ack correlation for mesh.
//!
//! Listeners are held in explicit [`ListenerSet`]s owned by whoever raises
//! the events, never in process-wide state. The [`AckCorrelator`] turns
//! routing acks into listener calls plus a store update.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ack;
pub mod listener;
pub mod packet;

pub use ack::{AckCorrelator, AckEvent, AckListener};
pub use listener::{ListenerId, ListenerSet};
pub use packet::MeshPacketListener;
