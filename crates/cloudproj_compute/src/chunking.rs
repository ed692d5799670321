//! Chunk partitioning
//!
//! A device buffer can hold at most `capacity` records, so a store is split
//! into `ceil(N / capacity)` contiguous chunks. Only the last chunk may be
//! smaller than the capacity.

use std::ops::Range;

use cloudproj_core::{PointRecord, PointStore, POINT_RECORD_SIZE};
use cloudproj_math::Aabb;

use crate::ComputeError;

/// One device-buffer-sized slice of a store
#[derive(Clone, Debug, Default)]
pub struct Chunk {
    pub records: Vec<PointRecord>,
    /// Store index of each record, kept in step with `records`
    pub source_indices: Vec<u32>,
    /// Bounds of the records currently held
    pub aabb: Aabb,
}

impl Chunk {
    pub fn new(records: Vec<PointRecord>, source_indices: Vec<u32>) -> Self {
        debug_assert_eq!(records.len(), source_indices.len());
        let aabb = Aabb::from_points(records.iter().map(|r| r.position));
        Self { records, source_indices, aabb }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Reorder or shrink the chunk so that entry `i` becomes `old[order[i]]`
    pub fn gather(&mut self, order: &[u32]) {
        self.records = order.iter().map(|&i| self.records[i as usize]).collect();
        self.source_indices = order.iter().map(|&i| self.source_indices[i as usize]).collect();
        self.aabb = Aabb::from_points(self.records.iter().map(|r| r.position));
    }

    /// Select this chunk's entries from a mask built over store indices
    pub fn project_mask(&self, mask: &[u8]) -> Vec<u8> {
        self.source_indices.iter().map(|&i| mask[i as usize]).collect()
    }
}

/// Splits stores into chunks of at most `capacity` records
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPartitioner {
    capacity: usize,
}

impl ChunkPartitioner {
    /// Create a partitioner; a zero capacity is a configuration error
    pub fn new(capacity: usize) -> Result<Self, ComputeError> {
        if capacity == 0 {
            return Err(ComputeError::InvalidConfig("chunk capacity must be non-zero".into()));
        }
        Ok(Self { capacity })
    }

    /// Partitioner for device buffers of `bytes` bytes
    pub fn from_buffer_bytes(bytes: u64) -> Result<Self, ComputeError> {
        Self::new(capacity_for_bytes(bytes))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index ranges of the chunks for `n` points
    pub fn ranges(&self, n: usize) -> Vec<Range<usize>> {
        (0..n.div_ceil(self.capacity))
            .map(|c| {
                let start = c * self.capacity;
                start..(start + self.capacity).min(n)
            })
            .collect()
    }

    /// Copy the store into chunks, in store order
    pub fn partition(&self, store: &PointStore) -> Vec<Chunk> {
        let records = store.records();
        self.ranges(records.len())
            .into_iter()
            .map(|range| {
                let indices = (range.start as u32..range.end as u32).collect();
                Chunk::new(records[range].to_vec(), indices)
            })
            .collect()
    }
}

/// Number of point records that fit in `bytes`
pub fn capacity_for_bytes(bytes: u64) -> usize {
    usize::try_from(bytes / POINT_RECORD_SIZE as u64).unwrap_or(usize::MAX)
}
