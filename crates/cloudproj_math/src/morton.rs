//! 30-bit Morton (Z-order) keys
//!
//! Each axis is quantized to 10 bits and the three fields are interleaved,
//! x taking the highest bit of every triple:
//!
//! ```text
//! key = ... x1 y1 z1 x0 y0 z0
//! ```

use crate::{Aabb, Vec3};

/// Number of significant bits in a key
pub const MORTON_BITS: u32 = 30;

/// Quantization steps per axis
pub const AXIS_RESOLUTION: u32 = 1 << 10;

/// Spread the low 10 bits of `v` so that two zero bits separate each bit
#[inline]
pub fn expand_bits_10(v: u32) -> u32 {
    let mut v = v & 0x3ff;
    v = (v.wrapping_mul(0x0001_0001)) & 0xff00_00ff;
    v = (v.wrapping_mul(0x0000_0101)) & 0x0f00_f00f;
    v = (v.wrapping_mul(0x0000_0011)) & 0xc30c_30c3;
    v = (v.wrapping_mul(0x0000_0005)) & 0x4924_9249;
    v
}

/// Interleave three already-quantized 10-bit cell coordinates
#[inline]
pub fn interleave(x: u32, y: u32, z: u32) -> u32 {
    (expand_bits_10(x) << 2) | (expand_bits_10(y) << 1) | expand_bits_10(z)
}

/// Quantize a normalized `[0, 1]` coordinate into `resolution` cells
#[inline]
pub fn quantize(v: f32, resolution: u32) -> u32 {
    let max = resolution.saturating_sub(1);
    ((v * resolution as f32).floor().max(0.0) as u32).min(max)
}

/// Morton key of a point normalized into `[0, 1]^3`
#[inline]
pub fn morton_encode(normalized: Vec3) -> u32 {
    interleave(
        quantize(normalized.x, AXIS_RESOLUTION),
        quantize(normalized.y, AXIS_RESOLUTION),
        quantize(normalized.z, AXIS_RESOLUTION),
    )
}

/// Morton key of a world-space point relative to a scene box
#[inline]
pub fn morton_key(aabb: &Aabb, point: Vec3) -> u32 {
    morton_encode(aabb.normalize(point))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_bits() {
        assert_eq!(expand_bits_10(0b1), 0b1);
        assert_eq!(expand_bits_10(0b11), 0b1001);
        assert_eq!(expand_bits_10(0x3ff), 0x0924_9249);
    }

    #[test]
    fn test_interleave_order() {
        assert_eq!(interleave(1, 0, 0), 0b100);
        assert_eq!(interleave(0, 1, 0), 0b010);
        assert_eq!(interleave(0, 0, 1), 0b001);
    }

    #[test]
    fn test_key_fits_in_30_bits() {
        let key = morton_encode(Vec3::ONE);
        assert_eq!(key, (1 << MORTON_BITS) - 1);
        assert_eq!(morton_encode(Vec3::ZERO), 0);
    }

    #[test]
    fn test_quantize_clamps() {
        assert_eq!(quantize(1.0, 1024), 1023);
        assert_eq!(quantize(-0.5, 1024), 0);
        assert_eq!(quantize(0.5, 4), 2);
        assert_eq!(quantize(0.9, 1), 0);
    }

    #[test]
    fn test_morton_key_uses_box() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        assert_eq!(morton_key(&aabb, Vec3::splat(2.0)), (1 << MORTON_BITS) - 1);
        assert!(morton_key(&aabb, Vec3::splat(0.5)) < morton_key(&aabb, Vec3::splat(1.5)));
    }
}
