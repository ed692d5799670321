//! Fixed-width integer encodings
//!
//! ## unorm8x4
//!
//! Four normalized `[0, 1]` floats packed into one `u32`, one byte each:
//!
//! ```text
//! bits  0..8   component 0 (x / red)
//! bits  8..16  component 1 (y / green)
//! bits 16..24  component 2 (z / blue)
//! bits 24..32  component 3 (w / alpha)
//! ```
//!
//! Each byte is `round(clamp(v, 0, 1) * 255)`, so a round trip is exact up
//! to 1/255 quantization.
//!
//! ## Ordered float bits
//!
//! Atomic-min over `u32`/`u64` only works on floats if the integer order
//! matches the float order. [`ordered_bits`] flips the sign bit for
//! positive values and all bits for negative ones.

/// Pack four normalized floats into a `u32`
#[inline]
pub fn pack_unorm4x8(v: [f32; 4]) -> u32 {
    let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
    byte(v[0]) | (byte(v[1]) << 8) | (byte(v[2]) << 16) | (byte(v[3]) << 24)
}

/// Unpack a `u32` into four normalized floats
#[inline]
pub fn unpack_unorm4x8(packed: u32) -> [f32; 4] {
    let byte = |shift: u32| ((packed >> shift) & 0xff) as f32 / 255.0;
    [byte(0), byte(8), byte(16), byte(24)]
}

/// Pack four bytes into a `u32` using the unorm8x4 byte order
#[inline]
pub fn pack_bytes(b: [u8; 4]) -> u32 {
    u32::from_le_bytes(b)
}

/// Unpack a `u32` into its four unorm8x4 bytes
#[inline]
pub fn unpack_bytes(packed: u32) -> [u8; 4] {
    packed.to_le_bytes()
}

/// Map an `f32` to a `u32` whose unsigned order equals the float order
#[inline]
pub fn ordered_bits(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// Inverse of [`ordered_bits`]
#[inline]
pub fn from_ordered_bits(bits: u32) -> f32 {
    if bits & 0x8000_0000 != 0 {
        f32::from_bits(bits & 0x7fff_ffff)
    } else {
        f32::from_bits(!bits)
    }
}
