//! Parallel LSD radix sort
//!
//! One bit per pass over the 30-bit key domain. Each pass:
//!
//! 1. classifies every element's current bit into is-zero / is-one flags,
//! 2. exclusive-scans the is-one flags,
//! 3. scatters zeros to the front and ones after them, both stable,
//! 4. swaps the two index buffers.
//!
//! The result is a permutation: `keys[perm[i]]` is non-decreasing.

use cloudproj_math::MORTON_BITS;

use crate::chunking::Chunk;
use crate::morton::morton_keys;
use crate::{exclusive_scan, AtomicBufferU32, Dispatcher};
use cloudproj_math::Aabb;

/// Sorts key arrays by producing a stable permutation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RadixSorter {
    bits: u32,
}

impl Default for RadixSorter {
    fn default() -> Self {
        Self { bits: MORTON_BITS }
    }
}

impl RadixSorter {
    /// Sorter over the low `bits` bits of each key
    pub fn with_bits(bits: u32) -> Self {
        Self { bits: bits.min(32) }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Stable permutation ordering `keys` ascending over the sorted bits
    pub fn sort(&self, dispatcher: &Dispatcher, keys: &[u32]) -> Vec<u32> {
        let n = keys.len();
        // A single element needs no scan
        if n <= 1 {
            return (0..n as u32).collect();
        }

        let is_zero = AtomicBufferU32::new(n, 0);
        let is_one = AtomicBufferU32::new(n, 0);
        let mut current = AtomicBufferU32::from_slice(&(0..n as u32).collect::<Vec<_>>());
        let mut next = AtomicBufferU32::new(n, 0);

        for bit in 0..self.bits {
            dispatcher.dispatch("radix::classify", n, |i| {
                let one = (keys[current.load(i) as usize] >> bit) & 1;
                is_one.store(i, one);
                is_zero.store(i, one ^ 1);
            });

            let (ones_before, total_ones) = exclusive_scan(dispatcher, &is_one.to_vec());
            let total_zeros = n - total_ones as usize;

            dispatcher.dispatch("radix::scatter", n, |i| {
                let dest = if is_zero.load(i) == 1 {
                    i - ones_before[i] as usize
                } else {
                    total_zeros + ones_before[i] as usize
                };
                next.store(dest, current.load(i));
            });

            std::mem::swap(&mut current, &mut next);
        }

        current.to_vec()
    }

    /// Sort a chunk's records by Morton key against the scene box
    pub fn sort_chunk(&self, dispatcher: &Dispatcher, chunk: &mut Chunk, scene: &Aabb) {
        let keys = morton_keys(dispatcher, &chunk.records, scene);
        let permutation = self.sort(dispatcher, &keys);
        chunk.gather(&permutation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random_keys(n: usize, seed: u64) -> Vec<u32> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as u32) & ((1 << MORTON_BITS) - 1)
            })
            .collect()
    }

    fn assert_sorted_bijection(keys: &[u32], perm: &[u32]) {
        assert_eq!(perm.len(), keys.len());
        let mut seen = vec![false; keys.len()];
        for &p in perm {
            assert!(!seen[p as usize], "index {} appears twice", p);
            seen[p as usize] = true;
        }
        for pair in perm.windows(2) {
            assert!(keys[pair[0] as usize] <= keys[pair[1] as usize]);
        }
    }

    #[test]
    fn test_trivial_sizes() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let sorter = RadixSorter::default();
        assert!(sorter.sort(&dispatcher, &[]).is_empty());
        assert_eq!(sorter.sort(&dispatcher, &[42]), vec![0]);
    }

    #[test]
    fn test_sorts_and_is_bijection() {
        let dispatcher = Dispatcher::new(4).unwrap();
        let sorter = RadixSorter::default();
        for n in [2usize, 3, 17, 256, 1000] {
            let keys = pseudo_random_keys(n, n as u64);
            let perm = sorter.sort(&dispatcher, &keys);
            assert_sorted_bijection(&keys, &perm);
        }
    }

    #[test]
    fn test_stable_for_equal_keys() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let keys = [5, 1, 5, 1, 5];
        let perm = RadixSorter::default().sort(&dispatcher, &keys);
        assert_eq!(perm, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_sort_chunk_orders_by_locality() {
        use cloudproj_core::PointRecord;
        use cloudproj_math::Vec3;

        let dispatcher = Dispatcher::new(2).unwrap();
        let positions = [Vec3::splat(9.0), Vec3::ZERO, Vec3::splat(4.0)];
        let records: Vec<PointRecord> = positions.iter().map(|&p| PointRecord::new(p, [0, 0, 0])).collect();
        let mut chunk = Chunk::new(records, vec![0, 1, 2]);
        let scene = Aabb::new(Vec3::ZERO, Vec3::splat(9.0));

        RadixSorter::default().sort_chunk(&dispatcher, &mut chunk, &scene);
        assert_eq!(chunk.source_indices, vec![1, 2, 0]);
        assert_eq!(chunk.records[0].position, Vec3::ZERO);
    }
}
