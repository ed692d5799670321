//! Per-pixel cell encodings
//!
//! ## DepthCell (standard path)
//!
//! ```text
//! bits 63..32  order-preserving bits of the f32 depth
//! bits 31..0   device slot (chunk base offset + local index)
//! ```
//!
//! Atomic-min over the packed value selects the nearest point and, among
//! equal depths, the lowest slot. `u64::MAX` marks a pixel with no hit.
//!
//! ## AccumulationCell (high-quality path)
//!
//! ```text
//! a = red_sum  << 32 | green_sum
//! b = blue_sum << 32 | weight
//! ```
//!
//! Sums are in 0..=255 units per point and the weight grows by one per
//! contributing point. Adding a point is one `fetch_add` per word.

use bitflags::bitflags;
use cloudproj_math::{from_ordered_bits, ordered_bits};

/// Packed (depth, slot) pair
pub struct DepthCell;

impl DepthCell {
    /// Value of a pixel no point has reached
    pub const EMPTY: u64 = u64::MAX;

    #[inline]
    pub fn encode(depth: f32, slot: u32) -> u64 {
        ((ordered_bits(depth) as u64) << 32) | slot as u64
    }

    /// `None` for [`DepthCell::EMPTY`]
    #[inline]
    pub fn decode(cell: u64) -> Option<(f32, u32)> {
        if cell == Self::EMPTY {
            None
        } else {
            Some((from_ordered_bits((cell >> 32) as u32), cell as u32))
        }
    }
}

/// Packed color accumulators of one pixel
pub struct AccumulationCell;

impl AccumulationCell {
    /// Increments for one point of color `rgb`
    #[inline]
    pub fn encode(rgb: [u8; 3]) -> (u64, u64) {
        let a = ((rgb[0] as u64) << 32) | rgb[1] as u64;
        let b = ((rgb[2] as u64) << 32) | 1;
        (a, b)
    }

    /// Channel sums and weight
    #[inline]
    pub fn decode(a: u64, b: u64) -> ([u64; 3], u64) {
        ([a >> 32, a & 0xffff_ffff, b >> 32], b & 0xffff_ffff)
    }

    /// Rounded average color, or `None` when nothing contributed
    #[inline]
    pub fn resolve(a: u64, b: u64) -> Option<[u8; 3]> {
        let (sums, weight) = Self::decode(a, b);
        if weight == 0 {
            return None;
        }
        Some(sums.map(|s| ((s + weight / 2) / weight).min(255) as u8))
    }
}

bitflags! {
    /// Masks consulted by the projection kernels
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MaskFlags: u32 {
        /// Skip points not selected by the height filter
        const VISIBILITY = 1 << 0;
        /// Skip points not selected by the ground filter
        const GROUND = 1 << 1;
    }
}

/// Where a point's displayed color comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSource {
    /// Stored RGB
    Rgb,
    /// Stored RGB stretched over the store's color range
    RgbNormalized,
    /// Palette indexed by normalized height
    Height,
    /// Palette indexed by `|normal.z|`
    Normal,
    /// Palette indexed by class id over the largest class id
    Class,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_cell_orders_by_depth_then_slot() {
        let near = DepthCell::encode(0.25, 900);
        let far = DepthCell::encode(0.75, 1);
        assert!(near < far);

        let low_slot = DepthCell::encode(0.5, 3);
        let high_slot = DepthCell::encode(0.5, 4);
        assert!(low_slot < high_slot);
        assert!(high_slot < DepthCell::EMPTY);
    }

    #[test]
    fn test_depth_cell_decode() {
        assert_eq!(DepthCell::decode(DepthCell::encode(0.5, 17)), Some((0.5, 17)));
        assert_eq!(DepthCell::decode(DepthCell::EMPTY), None);
    }

    #[test]
    fn test_accumulation_average() {
        let (a1, b1) = AccumulationCell::encode([10, 20, 30]);
        let (a2, b2) = AccumulationCell::encode([20, 21, 255]);
        let (sums, weight) = AccumulationCell::decode(a1 + a2, b1 + b2);
        assert_eq!(sums, [30, 41, 285]);
        assert_eq!(weight, 2);
        // 41 / 2 rounds up, 285 / 2 rounds up
        assert_eq!(AccumulationCell::resolve(a1 + a2, b1 + b2), Some([15, 21, 143]));
    }

    #[test]
    fn test_zero_weight_has_no_color() {
        assert_eq!(AccumulationCell::resolve(0, 0), None);
    }
}
