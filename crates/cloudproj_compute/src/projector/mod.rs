//! Point projection
//!
//! Two paths share the same point transform and gating:
//!
//! - [`StandardProjector`] - one atomic winner per pixel, packed (depth, slot)
//! - [`HqrProjector`] - resolves depth first, then averages every point
//!   within a relative depth band of the nearest one
//!
//! A point is projected with the view-projection matrix into clip space and
//! discarded when `w <= 0` or its NDC position leaves `[-1, 1]^3`. Pixels
//! use a top-left origin:
//!
//! ```text
//! px    = floor((ndc.x * 0.5 + 0.5) * width)
//! py    = floor((0.5 - ndc.y * 0.5) * height)
//! depth = ndc.z * 0.5 + 0.5
//! ```

pub mod types;
mod standard;
mod hqr;

pub use types::{AccumulationCell, ColorSource, DepthCell, MaskFlags};
pub use standard::StandardProjector;
pub use hqr::{HqrProjector, HqrTarget};

use cloudproj_core::{CloudMetadata, PointRecord};
use cloudproj_math::{mat4, Aabb, Mat4, Vec3};

use crate::{Chunk, Palette};

/// Default relative depth band of the high-quality path
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 1.01;

/// Per-frame inputs shared by every kernel of a frame
#[derive(Clone, Debug)]
pub struct ProjectionParams {
    pub view_proj: Mat4,
    pub width: u32,
    pub height: u32,
    pub color_source: ColorSource,
    /// Half-open range of class ids that are drawn
    pub class_range: (u32, u32),
    pub masks: MaskFlags,
    pub distance_threshold: f32,
}

impl ProjectionParams {
    pub fn new(view_proj: Mat4, width: u32, height: u32) -> Self {
        Self {
            view_proj,
            width,
            height,
            color_source: ColorSource::Rgb,
            class_range: (0, 256),
            masks: MaskFlags::empty(),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }

    pub fn with_color_source(mut self, source: ColorSource) -> Self {
        self.color_source = source;
        self
    }

    pub fn with_class_range(mut self, range: (u32, u32)) -> Self {
        self.class_range = range;
        self
    }

    pub fn with_masks(mut self, masks: MaskFlags) -> Self {
        self.masks = masks;
        self
    }

    pub fn with_distance_threshold(mut self, threshold: f32) -> Self {
        self.distance_threshold = threshold;
        self
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Where a point lands on screen
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenPoint {
    /// Row-major pixel index (`y * width + x`)
    pub pixel: usize,
    pub depth: f32,
}

/// Project one position, or `None` if it falls outside the view volume
#[inline]
pub fn project_point(view_proj: &Mat4, position: Vec3, width: u32, height: u32) -> Option<ScreenPoint> {
    let [cx, cy, cz, cw] = mat4::transform_point(view_proj, position);
    if cw <= 0.0 {
        return None;
    }
    let ndc = [cx / cw, cy / cw, cz / cw];
    if ndc.iter().any(|v| !(-1.0..=1.0).contains(v)) {
        return None;
    }
    let x = (((ndc[0] * 0.5 + 0.5) * width as f32).floor() as u32).min(width.saturating_sub(1));
    let y = (((0.5 - ndc[1] * 0.5) * height as f32).floor() as u32).min(height.saturating_sub(1));
    Some(ScreenPoint {
        pixel: y as usize * width as usize + x as usize,
        depth: ndc[2] * 0.5 + 0.5,
    })
}

/// A chunk as seen by the kernels: records, slot base and chunk-space masks
#[derive(Clone, Copy, Debug)]
pub struct ChunkBinding<'a> {
    pub chunk: &'a Chunk,
    /// Device slot of the chunk's first record
    pub base: u32,
    pub visibility: Option<&'a [u8]>,
    pub ground: Option<&'a [u8]>,
}

impl<'a> ChunkBinding<'a> {
    pub fn new(chunk: &'a Chunk, base: u32) -> Self {
        Self { chunk, base, visibility: None, ground: None }
    }

    pub fn with_visibility(mut self, mask: Option<&'a [u8]>) -> Self {
        self.visibility = mask;
        self
    }

    pub fn with_ground(mut self, mask: Option<&'a [u8]>) -> Self {
        self.ground = mask;
        self
    }

    /// True if record `i` passes the class range and the enabled masks.
    ///
    /// A mask flag without a bound mask lets every point through.
    #[inline]
    pub fn passes(&self, i: usize, params: &ProjectionParams) -> bool {
        let class = self.chunk.records[i].class_id();
        if class < params.class_range.0 || class >= params.class_range.1 {
            return false;
        }
        let gate = |flag: MaskFlags, mask: Option<&[u8]>| {
            !params.masks.contains(flag) || mask.map_or(true, |m| m[i] != 0)
        };
        gate(MaskFlags::VISIBILITY, self.visibility) && gate(MaskFlags::GROUND, self.ground)
    }
}

/// Find the binding owning device slot `slot`; bindings are sorted by base
pub fn locate_slot(bindings: &[ChunkBinding<'_>], slot: u32) -> Option<(usize, usize)> {
    let owner = bindings.partition_point(|b| b.base <= slot).checked_sub(1)?;
    let local = (slot - bindings[owner].base) as usize;
    (local < bindings[owner].chunk.len()).then_some((owner, local))
}

/// Data needed to turn a record into a display color
#[derive(Clone, Copy, Debug)]
pub struct ColorContext<'a> {
    pub scene: Aabb,
    pub metadata: CloudMetadata,
    pub palette: &'a Palette,
}

impl<'a> ColorContext<'a> {
    pub fn color(&self, source: ColorSource, record: &PointRecord) -> [u8; 3] {
        match source {
            ColorSource::Rgb => record.rgb(),
            ColorSource::RgbNormalized => {
                let min = self.metadata.min_color_channel;
                let span = self.metadata.color_span();
                record
                    .rgb()
                    .map(|c| (((c as f32 - min) / span).clamp(0.0, 1.0) * 255.0).round() as u8)
            }
            ColorSource::Height => {
                let extent = self.scene.size().z;
                let t = if extent > 0.0 {
                    (record.position.z - self.scene.min.z) / extent
                } else {
                    0.0
                };
                self.palette.sample(t)
            }
            ColorSource::Normal => self.palette.sample(record.normal.z.abs()),
            ColorSource::Class => {
                let max = self.metadata.max_class_id;
                let t = if max == 0 {
                    0.0
                } else {
                    record.class_id() as f32 / max as f32
                };
                self.palette.sample(t)
            }
        }
    }
}
