//! Point record as stored in caches and device buffers
//!
//! ```text
//! offset  size  field
//!      0    12  position     3 x f32
//!     12     4  color        unorm8x4 (r, g, b, a)
//!     16    12  normal       3 x f32, zero until computed
//!     28     4  return_class unorm8x4 (return number, return count, class, 0)
//! ```
//!
//! Return number and count are normalized by the dataset's maximum return
//! count. The class id is normalized by 256; its byte holds `class * 256`
//! (the raw id) so every id in `0..=255` decodes exactly.

use bytemuck::{Pod, Zeroable};
use cloudproj_math::packing::{pack_bytes, unpack_bytes};
use cloudproj_math::{pack_unorm4x8, unpack_unorm4x8, Vec3};

/// Size of one record in bytes
pub const POINT_RECORD_SIZE: usize = std::mem::size_of::<PointRecord>();

/// Divisor used to normalize LAS class ids
pub const CLASS_NORMALIZER: f32 = 256.0;

/// One point as laid out in device buffers and cache files
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointRecord {
    pub position: Vec3,
    pub color: u32,
    pub normal: Vec3,
    pub return_class: u32,
}

/// Decoded return/class metadata
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReturnClass {
    /// Return number divided by the dataset's max return count
    pub return_number: f32,
    /// Number of returns divided by the dataset's max return count
    pub return_count: f32,
    /// Class id divided by 256
    pub class: f32,
}

impl ReturnClass {
    /// Normalize raw LAS values against `max_returns`
    pub fn from_raw(return_number: u8, number_of_returns: u8, class_id: u8, max_returns: f32) -> Self {
        let max_returns = max_returns.max(1.0);
        Self {
            return_number: return_number as f32 / max_returns,
            return_count: number_of_returns as f32 / max_returns,
            class: class_id as f32 / CLASS_NORMALIZER,
        }
    }

    pub fn encode(&self) -> u32 {
        let [return_number, return_count, _, _] =
            unpack_bytes(pack_unorm4x8([self.return_number, self.return_count, 0.0, 0.0]));
        pack_bytes([return_number, return_count, self.class_byte(), 0])
    }

    pub fn decode(packed: u32) -> Self {
        let [return_number, return_count, _, _] = unpack_unorm4x8(packed);
        let [_, _, class, _] = unpack_bytes(packed);
        Self {
            return_number,
            return_count,
            class: class as f32 / CLASS_NORMALIZER,
        }
    }

    fn class_byte(&self) -> u8 {
        (self.class * CLASS_NORMALIZER).round().clamp(0.0, 255.0) as u8
    }

    /// Class id recovered from the normalized value
    pub fn class_id(&self) -> u32 {
        self.class_byte() as u32
    }
}

impl PointRecord {
    /// Create a record with an opaque color and no normal or class data
    pub fn new(position: Vec3, rgb: [u8; 3]) -> Self {
        Self {
            position,
            color: pack_bytes([rgb[0], rgb[1], rgb[2], 255]),
            normal: Vec3::ZERO,
            return_class: 0,
        }
    }

    /// Set the normal (builder pattern)
    pub fn with_normal(mut self, normal: Vec3) -> Self {
        self.normal = normal;
        self
    }

    /// Set the return/class metadata (builder pattern)
    pub fn with_return_class(mut self, return_class: ReturnClass) -> Self {
        self.return_class = return_class.encode();
        self
    }

    /// Color bytes without alpha
    #[inline]
    pub fn rgb(&self) -> [u8; 3] {
        let [r, g, b, _] = unpack_bytes(self.color);
        [r, g, b]
    }

    /// Decoded return/class metadata
    #[inline]
    pub fn return_class(&self) -> ReturnClass {
        ReturnClass::decode(self.return_class)
    }

    /// Class id of the point
    #[inline]
    pub fn class_id(&self) -> u32 {
        self.return_class().class_id()
    }
}
