//! Axis-aligned bounding box

use bytemuck::{Pod, Zeroable};
use serde::{Serialize, Deserialize};

use crate::Vec3;

/// Axis-aligned bounding box of a point set
///
/// A box only grows through [`Aabb::update`]; nothing shrinks it. An empty
/// box has `min = +inf` and `max = -inf` so the first update snaps it to
/// the point.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// Box containing nothing
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create a box from two corners (taken as given)
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Build the box around a set of points
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.update(p);
        }
        aabb
    }

    /// Grow the box to include `point`
    #[inline]
    pub fn update(&mut self, point: Vec3) {
        self.min = self.min.min_components(point);
        self.max = self.max.max_components(point);
    }

    /// Grow the box to include another box
    pub fn merge(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.update(other.min);
        self.update(other.max);
    }

    /// True until the first point is added
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Extent along each axis (zero for an empty box)
    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Center of the box
    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.min + self.max) * 0.5
        }
    }

    /// Map `point` into `[0, 1]^3` relative to the box.
    ///
    /// Degenerate axes (zero extent) map to 0. Points outside the box are
    /// clamped.
    pub fn normalize(&self, point: Vec3) -> Vec3 {
        let size = self.size();
        let axis = |v: f32, lo: f32, extent: f32| {
            if extent > 0.0 {
                ((v - lo) / extent).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        Vec3::new(
            axis(point.x, self.min.x, size.x),
            axis(point.y, self.min.y, size.y),
            axis(point.z, self.min.z, size.z),
        )
    }

    /// True if `point` lies inside or on the boundary
    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x
            && point.y >= self.min.y && point.y <= self.max.y
            && point.z >= self.min.z && point.z <= self.max.z
    }
}
