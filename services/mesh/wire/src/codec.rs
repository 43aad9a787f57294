//! CBOR encoding and decoding for control messages.
//!
//! Messages are a canonical CBOR map tagged by `kind`. Unknown kinds decode
//! to [`ControlMessage::Unknown`] so that newer peers do not break older ones.

use crate::error::WireError;
use crate::message::{ControlMessage, TransferId};
use bytes::Bytes;
use tracing::trace;

/// Largest application payload a single radio packet can carry
pub const MAX_PAYLOAD_LEN: usize = 233;

/// Encode a control message into a private-port payload
pub fn encode(message: &ControlMessage) -> Result<Bytes, WireError> {
    let mut buf = Vec::new();
    ciborium::into_writer(message, &mut buf).map_err(|e| WireError::Encode(e.to_string()))?;

    trace!("Encoded {} message into {} bytes", message.kind(), buf.len());
    Ok(Bytes::from(buf))
}

/// Encode a control message and fail if it does not fit in `limit` bytes
pub fn encode_with_limit(message: &ControlMessage, limit: usize) -> Result<Bytes, WireError> {
    let encoded = encode(message)?;
    if encoded.len() > limit {
        return Err(WireError::Size {
            size: encoded.len(),
            limit,
        });
    }
    Ok(encoded)
}

/// Length of a CBOR head carrying argument `n`
fn head_len(n: u64) -> usize {
    match n {
        0..=23 => 1,
        24..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

/// Largest part payload a FilePart for `id` can carry within `limit` bytes,
/// whatever its part index and part count. 0 when not even an empty part fits.
pub fn max_part_data_len(id: &TransferId, limit: usize) -> usize {
    let empty = ControlMessage::FilePart {
        file_transfer_id: id.clone(),
        part_index: u32::MAX,
        total_parts: u32::MAX,
        data: Bytes::new(),
    };
    let Ok(encoded) = encode(&empty) else {
        return 0;
    };
    // Everything but the byte string head
    let fixed = encoded.len() - head_len(0);
    if fixed + head_len(0) > limit {
        return 0;
    }

    let mut len = limit - fixed;
    while len > 0 && fixed + head_len(len as u64) + len > limit {
        len -= 1;
    }
    len
}

/// Number of leading `indexes` that fit in one RequestParts for `id` within
/// `limit` bytes
pub fn request_parts_capacity(id: &TransferId, indexes: &[u32], limit: usize) -> usize {
    let empty = ControlMessage::RequestParts {
        file_transfer_id: id.clone(),
        part_indexes: Vec::new(),
    };
    let Ok(encoded) = encode(&empty) else {
        return 0;
    };
    let fixed = encoded.len() - head_len(0);

    let mut body = 0;
    for (count, &index) in indexes.iter().enumerate() {
        body += head_len(u64::from(index));
        if fixed + head_len(count as u64 + 1) + body > limit {
            return count;
        }
    }
    indexes.len()
}

/// Decode a private-port payload into a control message
pub fn decode(payload: &[u8]) -> Result<ControlMessage, WireError> {
    if payload.is_empty() {
        return Err(WireError::Empty);
    }

    ciborium::from_reader(payload).map_err(|e| WireError::Decode(e.to_string()))
}
