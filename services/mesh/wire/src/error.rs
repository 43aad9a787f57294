//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Control message could not be serialized
    #[error("encode error: {0}")]
    Encode(String),

    /// Payload is not a valid control message
    #[error("decode error: {0}")]
    Decode(String),

    /// Encoded payload exceeds the radio payload limit
    #[error("size limit exceeded: {size} > {limit}")]
    Size {
        /// Encoded size in bytes
        size: usize,
        /// Configured limit in bytes
        limit: usize,
    },

    /// Empty payload
    #[error("empty payload")]
    Empty,

    /// Node id string could not be parsed
    #[error("invalid node id {0}")]
    InvalidNodeId(String),
}
