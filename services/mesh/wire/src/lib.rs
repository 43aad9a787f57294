//! Wire model for the mesh file-transfer engine.
//!
//! This crate holds everything that crosses the radio boundary: node ids,
//! the decoded mesh packet envelope, the file-transfer control messages and
//! their CBOR codec, and the part arithmetic used to slice payloads.
//!
//! ## Control message format
//!
//! ```text
//! +-----------------------------+-----------------------------+
//! | "kind": text                | offer | accept | reject |    |
//! |                             | cancel | completed |         |
//! |                             | file_part | request_parts    |
//! +-----------------------------+-----------------------------+
//! | variant fields (snake_case) | ids as text, part data as   |
//! |                             | a CBOR byte string          |
//! +-----------------------------+-----------------------------+
//! ```
//!
//! A full message must fit in [`MAX_PAYLOAD_LEN`] bytes to go out in one
//! radio packet.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod codec;
pub mod error;
pub mod message;
pub mod node;
pub mod packet;

// Re-export main types
pub use chunk::{part_range, progress_percent, slice_part, total_parts};
pub use codec::{decode, encode, encode_with_limit, max_part_data_len, request_parts_capacity, MAX_PAYLOAD_LEN};
pub use error::WireError;
pub use message::{ControlMessage, TransferId};
pub use node::NodeId;
pub use packet::{DataPayload, MeshPacket, PacketPayload, PortNum};
