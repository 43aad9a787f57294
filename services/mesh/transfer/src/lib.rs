//! File transfer over the mesh radio.
//!
//! A sender offers a file, the receiver accepts with the largest part it can
//! take, and the file then moves one part per control message. The receiver
//! pulls parts by index, so lost parts are simply requested again:
//!
//! ```text
//! sender                        receiver
//!   ── Offer ──────────────────▶
//!   ◀───────────── Accept(size) ─
//!   ── FilePart 0 ─────────────▶
//!   ◀──────── RequestParts [1] ──
//!   ── FilePart 1 ─────────────▶
//!   ...
//!   ◀──────────────── Completed ─
//! ```
//!
//! [`FileTransferEngine`] holds the state machine, [`PacketDispatcher`]
//! routes raw packets to it and to the ack correlator, and [`Transport`] is
//! the only way out to the radio.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod notifier;
pub mod registry;
pub mod sender;
pub mod transfer;
pub mod transport;

pub use assembler::ChunkAssembler;
pub use dispatch::PacketDispatcher;
pub use engine::{EngineConfig, EngineStats, FileTransferEngine, TransferEvent, TransferListener};
pub use error::TransferError;
pub use notifier::{EngineEvent, EventNotifier};
pub use registry::TransferRegistry;
pub use sender::{PartSender, SendOutcome};
pub use transfer::{Direction, Transfer, TransferSnapshot, TransferStatus};
pub use transport::{Transport, TransportError};
