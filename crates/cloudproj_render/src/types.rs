//! GPU-compatible data types for the projection kernels
//!
//! These types match the layouts in `shaders/project.wgsl` exactly.
//! All types derive Pod and Zeroable for safe GPU buffer operations.

use bytemuck::{Pod, Zeroable};
use cloudproj_math::packing::pack_bytes;
use cloudproj_math::{Mat4, Vec3};

/// Threads per workgroup of every projection kernel
pub const WORKGROUP_SIZE: u32 = 64;

/// Largest workgroup count along one dispatch dimension
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65535;

/// Marker for "no depth" and "no index" in the pixel buffers
pub const UNRESOLVED: u32 = u32::MAX;

/// A gated point as the kernels see it
///
/// The color is resolved on the CPU for the active visualization mode, so
/// the kernels only move packed RGBA8 words around.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuPoint {
    pub position: [f32; 3],
    /// RGBA8, red in the low byte
    pub color: u32,
}

impl GpuPoint {
    pub fn new(position: Vec3, rgb: [u8; 3]) -> Self {
        Self {
            position: position.to_array(),
            color: pack_bytes([rgb[0], rgb[1], rgb[2], 255]),
        }
    }
}

/// Per-chunk uniform block
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ProjectParams {
    /// Column-major view-projection matrix
    pub view_proj: Mat4,
    pub width: u32,
    pub height: u32,
    /// Points in this chunk's buffer
    pub point_count: u32,
    /// Slot of the chunk's first point
    pub base: u32,
    /// Packed RGBA8 background
    pub background: u32,
    /// Padding to a 16-byte multiple
    pub _padding: [u32; 3],
}

impl ProjectParams {
    pub fn new(view_proj: Mat4, width: u32, height: u32, background: [u8; 3]) -> Self {
        Self {
            view_proj,
            width,
            height,
            point_count: 0,
            base: 0,
            background: pack_bytes([background[0], background[1], background[2], 255]),
            _padding: [0; 3],
        }
    }

    pub fn for_chunk(mut self, base: u32, point_count: u32) -> Self {
        self.base = base;
        self.point_count = point_count;
        self
    }
}

/// Workgroup grid covering `threads` invocations.
///
/// Counts beyond one dimension's limit spill into y; the kernels rebuild
/// the flat id from `num_workgroups`.
pub fn workgroup_grid(threads: u32) -> (u32, u32) {
    let groups = threads.div_ceil(WORKGROUP_SIZE);
    if groups <= MAX_WORKGROUPS_PER_DIMENSION {
        (groups, 1)
    } else {
        (MAX_WORKGROUPS_PER_DIMENSION, groups.div_ceil(MAX_WORKGROUPS_PER_DIMENSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_match_shader() {
        assert_eq!(std::mem::size_of::<GpuPoint>(), 16);
        assert_eq!(std::mem::size_of::<ProjectParams>(), 96);
    }

    #[test]
    fn test_point_color_byte_order() {
        let point = GpuPoint::new(Vec3::new(1.0, 2.0, 3.0), [10, 20, 30]);
        assert_eq!(point.color.to_le_bytes(), [10, 20, 30, 255]);
        assert_eq!(point.position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_workgroup_grid() {
        assert_eq!(workgroup_grid(0), (0, 1));
        assert_eq!(workgroup_grid(1), (1, 1));
        assert_eq!(workgroup_grid(64 * 65535), (65535, 1));
        assert_eq!(workgroup_grid(64 * 65535 + 1), (65535, 2));
    }
}
