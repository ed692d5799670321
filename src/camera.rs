//! Fixed camera for offline frames
//!
//! Unset eye, target or far plane in [`CameraConfig`] are derived from the
//! bounds of the placed cloud, so a default config always frames the
//! whole dataset.

use cloudproj_math::{mat4, Aabb, Mat4, Vec3};

use crate::config::CameraConfig;

/// Direction from the target towards the default eye
const DEFAULT_VIEW_DIRECTION: Vec3 = Vec3::new(1.0, -1.0, 1.0);

/// Perspective look-at camera
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Camera from `config`, filling unset values so `bounds` is in view
    pub fn framing(bounds: &Aabb, config: &CameraConfig) -> Self {
        let (center, radius) = if bounds.is_empty() {
            (Vec3::ZERO, 1.0)
        } else {
            (bounds.center(), (bounds.size().length() * 0.5).max(1e-3))
        };

        let half_fov = (config.fov.to_radians() * 0.5).clamp(1e-3, std::f32::consts::FRAC_PI_2);
        let distance = radius / half_fov.sin();

        let target = config.target.map(Vec3::from_array).unwrap_or(center);
        let eye = config
            .eye
            .map(Vec3::from_array)
            .unwrap_or_else(|| target + DEFAULT_VIEW_DIRECTION.normalized() * distance);
        let far = config
            .far
            .unwrap_or_else(|| (eye - center).length() + 2.0 * radius);

        Self {
            eye,
            target,
            up: Vec3::from_array(config.up),
            fov: config.fov,
            near: config.near.min(far * 0.5),
            far,
        }
    }

    pub fn view(&self) -> Mat4 {
        mat4::look_at(self.eye, self.target, self.up)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        mat4::perspective(self.fov.to_radians(), aspect, self.near, self.far)
    }

    /// Combined projection * view for a `width` x `height` target
    pub fn view_projection(&self, width: u32, height: u32) -> Mat4 {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        mat4::mul(self.projection(aspect), self.view())
    }
}

/// Bounds of `aabb` after `transform`
pub fn transform_aabb(aabb: &Aabb, transform: &Mat4) -> Aabb {
    if aabb.is_empty() {
        return *aabb;
    }
    let corners = (0..8).map(|i| {
        let pick = |bit: usize, lo: f32, hi: f32| if i & bit == 0 { lo } else { hi };
        let corner = Vec3::new(
            pick(1, aabb.min.x, aabb.max.x),
            pick(2, aabb.min.y, aabb.max.y),
            pick(4, aabb.min.z, aabb.max.z),
        );
        let [x, y, z, w] = mat4::transform_point(transform, corner);
        Vec3::new(x / w, y / w, z / w)
    });
    Aabb::from_points(corners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudproj_compute::projector::project_point;

    fn bounds() -> Aabb {
        Aabb::new(Vec3::new(-5.0, 10.0, 0.0), Vec3::new(5.0, 30.0, 4.0))
    }

    #[test]
    fn test_default_camera_frames_bounds() {
        let b = bounds();
        let camera = Camera::framing(&b, &CameraConfig::default());
        let view_proj = camera.view_projection(200, 100);

        let center = project_point(&view_proj, b.center(), 200, 100).unwrap();
        let (x, y) = (center.pixel % 200, center.pixel / 200);
        assert!((99..=100).contains(&x) && (49..=50).contains(&y), "({}, {})", x, y);

        for corner in [b.min, b.max, Vec3::new(b.min.x, b.max.y, b.min.z)] {
            assert!(project_point(&view_proj, corner, 200, 100).is_some(), "{:?}", corner);
        }
    }

    #[test]
    fn test_config_overrides() {
        let config = CameraConfig {
            eye: Some([0.0, 0.0, 50.0]),
            target: Some([1.0, 2.0, 3.0]),
            far: Some(500.0),
            ..CameraConfig::default()
        };
        let camera = Camera::framing(&bounds(), &config);
        assert_eq!(camera.eye, Vec3::new(0.0, 0.0, 50.0));
        assert_eq!(camera.target, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(camera.far, 500.0);
    }

    #[test]
    fn test_empty_bounds() {
        let camera = Camera::framing(&Aabb::EMPTY, &CameraConfig::default());
        assert_eq!(camera.target, Vec3::ZERO);
        assert!(camera.far > camera.near);
    }

    #[test]
    fn test_transform_aabb() {
        let moved = transform_aabb(&bounds(), &mat4::translation(Vec3::new(1.0, 0.0, -1.0)));
        assert_eq!(moved.min, Vec3::new(-4.0, 10.0, -1.0));
        assert_eq!(moved.max, Vec3::new(6.0, 30.0, 3.0));
    }
}
