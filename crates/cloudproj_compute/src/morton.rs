//! Morton key kernel
//!
//! Keys are computed against the scene box, not the chunk box, so points
//! keep the same key whichever chunk they land in.

use cloudproj_core::PointRecord;
use cloudproj_math::morton::morton_key;
use cloudproj_math::Aabb;

use crate::Dispatcher;

/// 30-bit Z-order key of every record
pub fn morton_keys(dispatcher: &Dispatcher, records: &[PointRecord], scene: &Aabb) -> Vec<u32> {
    dispatcher.map(records.len(), |i| morton_key(scene, records[i].position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudproj_math::{Vec3, MORTON_BITS};

    #[test]
    fn test_keys_follow_space() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let records: Vec<PointRecord> = [Vec3::ZERO, Vec3::splat(10.0), Vec3::splat(5.0)]
            .into_iter()
            .map(|p| PointRecord::new(p, [0, 0, 0]))
            .collect();
        let scene = Aabb::new(Vec3::ZERO, Vec3::splat(10.0));
        let keys = morton_keys(&dispatcher, &records, &scene);
        assert_eq!(keys[0], 0);
        assert_eq!(keys[1], (1 << MORTON_BITS) - 1);
        assert!(keys[0] < keys[2] && keys[2] < keys[1]);
    }

    #[test]
    fn test_degenerate_axis_maps_to_zero() {
        let dispatcher = Dispatcher::new(1).unwrap();
        let records = vec![PointRecord::new(Vec3::new(3.0, 7.0, 7.0), [0, 0, 0])];
        let scene = Aabb::new(Vec3::new(0.0, 7.0, 7.0), Vec3::new(4.0, 7.0, 7.0));
        let keys = morton_keys(&dispatcher, &records, &scene);
        // Only x bits (position 2 of each triple) may be set
        assert_eq!(keys[0] & 0b011_011_011_011_011_011_011_011_011_011, 0);
    }
}
