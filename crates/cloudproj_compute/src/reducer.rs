//! Iterative grid reduction
//!
//! Each iteration keeps one point per occupied grid cell. The grid spans
//! the chunk's own bounds and halves its resolution every iteration, so
//! later iterations are coarser:
//!
//! ```text
//! resolution(k) = max(1, R >> k) cells per axis
//! ```
//!
//! The representative of a cell is chosen through a lock-free
//! open-addressing table of `u64` slots holding `(cell + 1) << 32 | index`.
//! A thread claims an empty slot with compare-and-swap or, when the slot
//! already holds its cell, lowers the index with atomic-min, so the lowest
//! index of a cell always wins regardless of scheduling.

use cloudproj_math::morton::{interleave, quantize, AXIS_RESOLUTION};

use crate::chunking::Chunk;
use crate::{exclusive_scan, AtomicBufferU32, AtomicBufferU64, Dispatcher};

const EMPTY_SLOT: u64 = 0;

/// Point counts of one chunk across a reduction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReductionReport {
    /// `counts[0]` is the input size, `counts[k + 1]` the survivors of iteration `k`
    pub counts: Vec<usize>,
}

impl ReductionReport {
    pub fn input(&self) -> usize {
        self.counts.first().copied().unwrap_or(0)
    }

    pub fn output(&self) -> usize {
        self.counts.last().copied().unwrap_or(0)
    }
}

/// Shrinks chunks by keeping one point per grid cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointReducer {
    pub iterations: u32,
    pub grid_resolution: u32,
}

impl PointReducer {
    pub fn new(iterations: u32, grid_resolution: u32) -> Self {
        Self {
            iterations,
            grid_resolution: grid_resolution.clamp(1, AXIS_RESOLUTION),
        }
    }

    /// Cells per axis used by iteration `k`
    pub fn resolution(&self, iteration: u32) -> u32 {
        self.grid_resolution.checked_shr(iteration).unwrap_or(0).max(1)
    }

    /// Run every iteration on `chunk`, replacing its contents
    pub fn reduce(&self, dispatcher: &Dispatcher, chunk: &mut Chunk) -> ReductionReport {
        let mut counts = vec![chunk.len()];
        for k in 0..self.iterations {
            let survivors = self.reduce_once(dispatcher, chunk, self.resolution(k));
            chunk.gather(&survivors);
            counts.push(chunk.len());
        }
        ReductionReport { counts }
    }

    /// Indices of the representatives of one iteration, in chunk order
    fn reduce_once(&self, dispatcher: &Dispatcher, chunk: &Chunk, resolution: u32) -> Vec<u32> {
        let n = chunk.len();
        if n == 0 {
            return Vec::new();
        }

        let aabb = chunk.aabb;
        let cells: Vec<u32> = dispatcher.map(n, |i| {
            let p = aabb.normalize(chunk.records[i].position);
            interleave(
                quantize(p.x, resolution),
                quantize(p.y, resolution),
                quantize(p.z, resolution),
            )
        });

        let table = AtomicBufferU64::new((2 * n).next_power_of_two(), EMPTY_SLOT);
        let mask = table.len() - 1;

        dispatcher.dispatch("reduce::insert", n, |i| {
            let tag = (cells[i] as u64 + 1) << 32;
            let entry = tag | i as u64;
            let mut slot = hash(cells[i]) as usize & mask;
            loop {
                match table.compare_exchange(slot, EMPTY_SLOT, entry) {
                    Ok(_) => break,
                    Err(current) if current & !0xffff_ffff == tag => {
                        table.fetch_min(slot, entry);
                        break;
                    }
                    Err(_) => slot = (slot + 1) & mask,
                }
            }
        });

        let keep = AtomicBufferU32::new(n, 0);
        dispatcher.dispatch("reduce::select", n, |i| {
            let tag = (cells[i] as u64 + 1) << 32;
            let mut slot = hash(cells[i]) as usize & mask;
            loop {
                let current = table.load(slot);
                if current & !0xffff_ffff == tag {
                    keep.store(i, ((current & 0xffff_ffff) as usize == i) as u32);
                    break;
                }
                slot = (slot + 1) & mask;
            }
        });

        let flags = keep.to_vec();
        let (offsets, total) = exclusive_scan(dispatcher, &flags);
        let survivors = AtomicBufferU32::new(total as usize, 0);
        dispatcher.dispatch("reduce::compact", n, |i| {
            if flags[i] == 1 {
                survivors.store(offsets[i] as usize, i as u32);
            }
        });

        survivors.to_vec()
    }
}

/// Integer finalizer spreading Morton cells over the table
#[inline]
fn hash(cell: u32) -> u32 {
    let mut h = cell;
    h ^= h >> 16;
    h = h.wrapping_mul(0x7feb_352d);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846c_a68b);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudproj_core::PointRecord;
    use cloudproj_math::Vec3;

    fn chunk(positions: &[Vec3]) -> Chunk {
        let records = positions.iter().map(|&p| PointRecord::new(p, [0, 0, 0])).collect();
        Chunk::new(records, (0..positions.len() as u32).collect())
    }

    fn lattice(n: usize) -> Vec<Vec3> {
        let mut points = Vec::new();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    points.push(Vec3::new(x as f32, y as f32, z as f32));
                }
            }
        }
        points
    }

    #[test]
    fn test_resolution_halves() {
        let reducer = PointReducer::new(4, 8);
        assert_eq!(reducer.resolution(0), 8);
        assert_eq!(reducer.resolution(1), 4);
        assert_eq!(reducer.resolution(3), 1);
        assert_eq!(reducer.resolution(40), 1);
    }

    #[test]
    fn test_duplicates_collapse_to_lowest_index() {
        let dispatcher = Dispatcher::new(4).unwrap();
        let mut c = chunk(&[
            Vec3::ZERO,
            Vec3::splat(10.0),
            Vec3::ZERO,
            Vec3::splat(10.0),
            Vec3::new(0.01, 0.0, 0.0),
        ]);
        let report = PointReducer::new(1, 16).reduce(&dispatcher, &mut c);
        assert_eq!(report.counts, vec![5, 2]);
        assert_eq!(c.source_indices, vec![0, 1]);
    }

    #[test]
    fn test_counts_never_increase() {
        let dispatcher = Dispatcher::new(4).unwrap();
        let mut c = chunk(&lattice(8));
        let report = PointReducer::new(4, 8).reduce(&dispatcher, &mut c);
        assert_eq!(report.input(), 512);
        for pair in report.counts.windows(2) {
            assert!(pair[1] <= pair[0], "{:?}", report.counts);
        }
        assert_eq!(report.counts, vec![512, 512, 64, 8, 1]);
        assert_eq!(report.output(), c.len());
        assert_eq!(c.source_indices.len(), c.records.len());
    }

    #[test]
    fn test_single_cell_keeps_one_point() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let mut c = chunk(&lattice(3));
        let report = PointReducer::new(1, 1).reduce(&dispatcher, &mut c);
        assert_eq!(report.counts, vec![27, 1]);
        assert_eq!(c.source_indices, vec![0]);
    }

    #[test]
    fn test_empty_chunk() {
        let dispatcher = Dispatcher::new(1).unwrap();
        let mut c = Chunk::default();
        let report = PointReducer::new(3, 64).reduce(&dispatcher, &mut c);
        assert_eq!(report.counts, vec![0, 0, 0, 0]);
    }
}
