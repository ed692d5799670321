//! LAS/LAZ reader built on the `las` crate
//!
//! Positions are stored relative to the header offset so that large
//! projected coordinates keep their precision as `f32`. Without an RGB
//! channel the intensity is scaled into a gray color.

use std::path::Path;

use cloudproj_math::Vec3;
use las::Reader;

use crate::{CloudError, PointRecord, PointStore, ReturnClass};

/// Per-return buckets consulted when deriving the return normalizer
const RETURN_BUCKETS: u8 = 5;

/// Divisor for return number and return count.
///
/// Counts the leading non-empty per-return buckets, subtracts one and
/// clamps to `1..=255`.
pub fn max_return_count(points_by_return: &[u64]) -> f32 {
    let filled = points_by_return
        .iter()
        .take(RETURN_BUCKETS as usize)
        .take_while(|&&n| n != 0)
        .count();
    (filled as f32 - 1.0).clamp(1.0, 255.0)
}

/// Scale 16-bit LAS color channels down to 8 bits.
///
/// Files that only use the low byte are kept as-is.
fn to_rgb8(rgb: [u16; 3], wide: bool) -> [u8; 3] {
    rgb.map(|c| if wide { (c >> 8) as u8 } else { c.min(255) as u8 })
}

fn intensity_gray(intensity: u16, max_intensity: u16) -> [u8; 3] {
    let g = if max_intensity == 0 {
        0
    } else {
        ((intensity as f32 / max_intensity as f32) * 255.0).round() as u8
    };
    [g, g, g]
}

struct RawPoint {
    position: Vec3,
    rgb: Option<[u16; 3]>,
    intensity: u16,
    return_number: u8,
    number_of_returns: u8,
    class_id: u8,
}

/// Read a `.las` or `.laz` file into a new store
pub fn read_las(path: &Path) -> Result<PointStore, CloudError> {
    let mut reader = Reader::from_path(path)?;
    let header = reader.header();
    let total = header.number_of_points() as usize;
    let offset = header.transforms();
    let (ox, oy, oz) = (offset.x.offset, offset.y.offset, offset.z.offset);
    let by_return: Vec<u64> = (1..=RETURN_BUCKETS)
        .map(|n| header.number_of_points_by_return(n).unwrap_or(0))
        .collect();
    let max_returns = max_return_count(&by_return);

    log::info!("Reading {} ({} points)", path.display(), total);

    let mut raw = Vec::with_capacity(total);
    for point in reader.points() {
        let point = point?;
        raw.push(RawPoint {
            position: Vec3::new(
                (point.x - ox) as f32,
                (point.y - oy) as f32,
                (point.z - oz) as f32,
            ),
            rgb: point.color.map(|c| [c.red, c.green, c.blue]),
            intensity: point.intensity,
            return_number: point.return_number,
            number_of_returns: point.number_of_returns,
            class_id: u8::from(point.classification),
        });
    }

    Ok(build_store(raw, max_returns))
}

fn build_store(raw: Vec<RawPoint>, max_returns: f32) -> PointStore {
    let has_rgb = raw.iter().any(|p| p.rgb.is_some());
    let wide = raw
        .iter()
        .filter_map(|p| p.rgb)
        .any(|rgb| rgb.iter().any(|&c| c > 255));
    let max_intensity = raw.iter().map(|p| p.intensity).max().unwrap_or(0);

    let mut store = PointStore::with_capacity(raw.len());
    store.channels.color = has_rgb;
    store.channels.intensity = !has_rgb;
    store.channels.classification = true;
    store.channels.returns = true;
    store.metadata.max_return_count = max_returns;

    for p in raw {
        let rgb = match p.rgb {
            Some(rgb) => to_rgb8(rgb, wide),
            None => intensity_gray(p.intensity, max_intensity),
        };
        let return_class =
            ReturnClass::from_raw(p.return_number, p.number_of_returns, p.class_id, max_returns);
        store.metadata.max_class_id = store.metadata.max_class_id.max(p.class_id);
        store.push(PointRecord::new(p.position, rgb).with_return_class(return_class));
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(z: f32, rgb: Option<[u16; 3]>, intensity: u16, class_id: u8) -> RawPoint {
        RawPoint {
            position: Vec3::new(0.0, 0.0, z),
            rgb,
            intensity,
            return_number: 1,
            number_of_returns: 2,
            class_id,
        }
    }

    #[test]
    fn test_max_return_count() {
        assert_eq!(max_return_count(&[10, 0, 0, 0, 0]), 1.0);
        assert_eq!(max_return_count(&[10, 5, 3, 0, 0]), 2.0);
        assert_eq!(max_return_count(&[10, 5, 3, 2, 1]), 4.0);
        // Buckets after the first empty one are ignored
        assert_eq!(max_return_count(&[10, 0, 3, 2, 1]), 1.0);
        assert_eq!(max_return_count(&[]), 1.0);
    }

    #[test]
    fn test_intensity_becomes_gray() {
        let store = build_store(vec![raw(0.0, None, 50, 2), raw(1.0, None, 100, 6)], 2.0);
        assert!(store.channels.intensity);
        assert!(!store.channels.color);
        assert_eq!(store.records()[0].rgb(), [128, 128, 128]);
        assert_eq!(store.records()[1].rgb(), [255, 255, 255]);
        assert_eq!(store.metadata.max_class_id, 6);
        assert_eq!(store.records()[1].class_id(), 6);
    }

    #[test]
    fn test_wide_rgb_is_scaled() {
        let store = build_store(vec![raw(0.0, Some([65535, 256, 0]), 0, 1)], 1.0);
        assert_eq!(store.records()[0].rgb(), [255, 1, 0]);
    }

    #[test]
    fn test_narrow_rgb_is_kept() {
        let store = build_store(vec![raw(0.0, Some([200, 100, 0]), 0, 1)], 1.0);
        assert_eq!(store.records()[0].rgb(), [200, 100, 0]);
    }

    #[test]
    fn test_returns_are_normalized() {
        let store = build_store(vec![raw(0.0, None, 0, 0)], 2.0);
        let rc = store.records()[0].return_class();
        assert!((rc.return_number - 0.5).abs() <= 1.0 / 255.0);
        assert!((rc.return_count - 1.0).abs() <= 1.0 / 255.0);
        assert_eq!(store.metadata.max_return_count, 2.0);
    }
}
