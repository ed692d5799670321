//! In-memory point store
//!
//! A [`PointStore`] holds every record of a loaded dataset together with
//! its bounding box and the radiometric metadata the cache file persists.

use cloudproj_math::{Aabb, Vec3};

use crate::PointRecord;

/// Which optional channels the source actually provided
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceChannels {
    pub color: bool,
    pub intensity: bool,
    pub normals: bool,
    pub classification: bool,
    pub returns: bool,
}

/// Dataset-wide values stored after the records in a cache file
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CloudMetadata {
    pub normals_computed: bool,
    /// Largest color channel value seen (0..255 units)
    pub max_color_channel: f32,
    /// Smallest color channel value seen (0..255 units)
    pub min_color_channel: f32,
    pub max_class_id: u8,
    /// Divisor used for return number and return count
    pub max_return_count: f32,
}

impl Default for CloudMetadata {
    fn default() -> Self {
        Self {
            normals_computed: false,
            max_color_channel: 0.0,
            min_color_channel: 255.0,
            max_class_id: 0,
            max_return_count: 1.0,
        }
    }
}

impl CloudMetadata {
    /// Width of the observed color range, never below one channel step
    pub fn color_span(&self) -> f32 {
        (self.max_color_channel - self.min_color_channel).max(1.0)
    }
}

/// All records of one dataset plus a bounding box that only grows
#[derive(Clone, Debug, Default)]
pub struct PointStore {
    records: Vec<PointRecord>,
    aabb: Aabb,
    pub metadata: CloudMetadata,
    pub channels: SourceChannels,
}

impl PointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Rebuild a store from parts read back from a cache file
    pub fn from_parts(records: Vec<PointRecord>, aabb: Aabb, metadata: CloudMetadata) -> Self {
        Self {
            records,
            aabb,
            metadata,
            channels: SourceChannels {
                color: true,
                normals: metadata.normals_computed,
                ..SourceChannels::default()
            },
        }
    }

    /// Append a record, growing the box and the observed color range
    pub fn push(&mut self, record: PointRecord) {
        self.aabb.update(record.position);
        for channel in record.rgb() {
            let c = channel as f32;
            self.metadata.min_color_channel = self.metadata.min_color_channel.min(c);
            self.metadata.max_color_channel = self.metadata.max_color_channel.max(c);
        }
        self.records.push(record);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[PointRecord] {
        &self.records
    }

    #[inline]
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Replace every normal; `normals.len()` must equal the record count
    pub fn set_normals(&mut self, normals: &[Vec3]) {
        debug_assert_eq!(normals.len(), self.records.len());
        for (record, normal) in self.records.iter_mut().zip(normals) {
            record.normal = *normal;
        }
        self.metadata.normals_computed = true;
        self.channels.normals = true;
    }

    /// Iterator over positions
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.records.iter().map(|r| r.position)
    }
}

impl FromIterator<PointRecord> for PointStore {
    fn from_iter<I: IntoIterator<Item = PointRecord>>(iter: I) -> Self {
        let mut store = PointStore::new();
        for record in iter {
            store.push(record);
        }
        store
    }
}
