//! Work-efficient exclusive prefix sum
//!
//! Blelloch scan over the input padded to a power of two:
//!
//! 1. Up-sweep: `log2(n)` levels build partial sums in place.
//! 2. The total is read from the last slot, then the slot is set to zero.
//! 3. Down-sweep: `log2(n)` levels push prefixes back down the tree.
//!
//! Every level is one kernel dispatch. Within a level each thread touches
//! its own pair of slots.

use crate::{AtomicBufferU32, Dispatcher};

/// Exclusive prefix sum of `values` and their total.
///
/// Sums wrap on overflow, as they would in a `u32` device buffer.
pub fn exclusive_scan(dispatcher: &Dispatcher, values: &[u32]) -> (Vec<u32>, u32) {
    let len = values.len();
    // Zero and one elements never reach the tree passes
    match len {
        0 => return (Vec::new(), 0),
        1 => return (vec![0], values[0]),
        _ => {}
    }

    let padded = len.next_power_of_two();
    let levels = padded.trailing_zeros();
    let buffer = AtomicBufferU32::new(padded, 0);
    dispatcher.dispatch("scan::load", len, |i| buffer.store(i, values[i]));

    for level in 0..levels {
        let stride = 1usize << level;
        dispatcher.dispatch("scan::up_sweep", padded >> (level + 1), |tid| {
            let right = (tid + 1) * 2 * stride - 1;
            let left = right - stride;
            buffer.store(right, buffer.load(right).wrapping_add(buffer.load(left)));
        });
    }

    let total = buffer.load(padded - 1);
    buffer.store(padded - 1, 0);

    for level in (0..levels).rev() {
        let stride = 1usize << level;
        dispatcher.dispatch("scan::down_sweep", padded >> (level + 1), |tid| {
            let right = (tid + 1) * 2 * stride - 1;
            let left = right - stride;
            let carried = buffer.load(left);
            buffer.store(left, buffer.load(right));
            buffer.store(right, buffer.load(right).wrapping_add(carried));
        });
    }

    let mut out = buffer.to_vec();
    out.truncate(len);
    (out, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serial_scan(values: &[u32]) -> (Vec<u32>, u32) {
        let mut acc = 0u32;
        let out = values
            .iter()
            .map(|&v| {
                let before = acc;
                acc = acc.wrapping_add(v);
                before
            })
            .collect();
        (out, acc)
    }

    #[test]
    fn test_small_inputs() {
        let dispatcher = Dispatcher::new(2).unwrap();
        assert_eq!(exclusive_scan(&dispatcher, &[]), (vec![], 0));
        assert_eq!(exclusive_scan(&dispatcher, &[7]), (vec![0], 7));
        assert_eq!(exclusive_scan(&dispatcher, &[3, 4]), (vec![0, 3], 7));
    }

    #[test]
    fn test_matches_serial_scan() {
        let dispatcher = Dispatcher::new(4).unwrap();
        for len in [3usize, 5, 8, 13, 64, 100, 1000] {
            let values: Vec<u32> = (0..len).map(|i| ((i * 7919) % 5) as u32).collect();
            assert_eq!(exclusive_scan(&dispatcher, &values), serial_scan(&values), "len {}", len);
        }
    }

    #[test]
    fn test_binary_flags() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let (offsets, total) = exclusive_scan(&dispatcher, &[1, 0, 1, 1, 0]);
        assert_eq!(offsets, vec![0, 1, 1, 2, 3]);
        assert_eq!(total, 3);
    }
}
