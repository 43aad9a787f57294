//! Out-of-order part collection and reassembly

use crate::error::TransferError;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;

/// Collects received parts keyed by index
#[derive(Debug, Clone, Default)]
pub struct ChunkAssembler {
    chunks: BTreeMap<u32, Bytes>,
}

impl ChunkAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Store part `index`. A later write for the same index replaces the
    /// earlier one. Returns true if the index was already present.
    pub fn store(&mut self, index: u32, data: Bytes) -> bool {
        self.chunks.insert(index, data).is_some()
    }

    /// Whether part `index` has been stored
    pub fn contains(&self, index: u32) -> bool {
        self.chunks.contains_key(&index)
    }

    /// Number of distinct parts stored
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether `index` is the final part of `total`
    pub fn is_final_part(index: u32, total: u32) -> bool {
        total > 0 && index == total - 1
    }

    /// Whether every index in `0..total` is present
    pub fn has_all(&self, total: u32) -> bool {
        total > 0 && self.received(total) == total
    }

    /// Number of stored indexes below `total`
    pub fn received(&self, total: u32) -> u32 {
        self.chunks.range(..total).count() as u32
    }

    /// Indexes in `0..total` not yet stored, ascending
    pub fn missing(&self, total: u32) -> Vec<u32> {
        (0..total).filter(|index| !self.contains(*index)).collect()
    }

    /// First missing index after `index`, wrapping to the lowest gap
    pub fn next_missing_after(&self, index: u32, total: u32) -> Option<u32> {
        let next = index.saturating_add(1);
        (next..total)
            .chain(0..next.min(total))
            .find(|candidate| !self.contains(*candidate))
    }

    /// Concatenate parts `0..total` in index order
    pub fn finalize(&self, total: u32) -> Result<Bytes, TransferError> {
        let size = self.chunks.range(..total).map(|(_, chunk)| chunk.len()).sum();
        let mut blob = BytesMut::with_capacity(size);

        for index in 0..total {
            let chunk = self
                .chunks
                .get(&index)
                .ok_or(TransferError::MissingChunk { index })?;
            blob.extend_from_slice(chunk);
        }

        Ok(blob.freeze())
    }
}
