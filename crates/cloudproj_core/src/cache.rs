//! Binary cache files
//!
//! One point cloud per file, all values little-endian:
//!
//! ```text
//! u64            point count
//! count x 32 B   PointRecord (3 x f32, u32, 3 x f32, u32)
//! 6 x f32        AABB min xyz, max xyz
//! u8             normals computed
//! f32            max color channel
//! f32            min color channel
//! u8             max class id
//! f32            max return count
//! ```
//!
//! Files whose length does not match the declared count are rejected.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cloudproj_math::{Aabb, Vec3};

use crate::{BackgroundTask, CloudError, CloudMetadata, PointRecord, PointStore, POINT_RECORD_SIZE};

/// Extension appended to a dataset stem
pub const CACHE_EXTENSION: &str = "bin";

const COUNT_SIZE: usize = 8;
const TRAILER_SIZE: usize = 6 * 4 + 1 + 4 + 4 + 1 + 4;

/// Exact file size for `count` points
pub fn expected_size(count: u64) -> Option<usize> {
    usize::try_from(count)
        .ok()?
        .checked_mul(POINT_RECORD_SIZE)?
        .checked_add(COUNT_SIZE + TRAILER_SIZE)
}

/// `<stem>.bin`, keeping any dots already in the stem
pub fn cache_path(stem: &Path) -> PathBuf {
    let mut path = stem.as_os_str().to_owned();
    path.push(".");
    path.push(CACHE_EXTENSION);
    PathBuf::from(path)
}

/// Serialize a store into cache bytes
pub fn encode(store: &PointStore) -> Vec<u8> {
    let count = store.len();
    let mut out = Vec::with_capacity(count * POINT_RECORD_SIZE + COUNT_SIZE + TRAILER_SIZE);

    out.extend_from_slice(&(count as u64).to_le_bytes());
    for record in store.records() {
        put_vec3(&mut out, record.position);
        out.extend_from_slice(&record.color.to_le_bytes());
        put_vec3(&mut out, record.normal);
        out.extend_from_slice(&record.return_class.to_le_bytes());
    }

    let aabb = store.aabb();
    put_vec3(&mut out, aabb.min);
    put_vec3(&mut out, aabb.max);

    let meta = &store.metadata;
    out.push(meta.normals_computed as u8);
    out.extend_from_slice(&meta.max_color_channel.to_le_bytes());
    out.extend_from_slice(&meta.min_color_channel.to_le_bytes());
    out.push(meta.max_class_id);
    out.extend_from_slice(&meta.max_return_count.to_le_bytes());
    out
}

/// Parse cache bytes back into a store
pub fn decode(bytes: &[u8]) -> Result<PointStore, CloudError> {
    let mut reader = ByteReader::new(bytes);
    let count = reader.u64()?;
    let expected = expected_size(count)
        .ok_or_else(|| CloudError::Parse(format!("cache declares {} points", count)))?;
    if bytes.len() != expected {
        return Err(CloudError::Parse(format!(
            "cache size mismatch: {} points need {} bytes, file has {}",
            count,
            expected,
            bytes.len()
        )));
    }

    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let position = reader.vec3()?;
        let color = reader.u32()?;
        let normal = reader.vec3()?;
        let return_class = reader.u32()?;
        records.push(PointRecord { position, color, normal, return_class });
    }

    let aabb = Aabb::new(reader.vec3()?, reader.vec3()?);
    let metadata = CloudMetadata {
        normals_computed: reader.u8()? != 0,
        max_color_channel: reader.f32()?,
        min_color_channel: reader.f32()?,
        max_class_id: reader.u8()?,
        max_return_count: reader.f32()?,
    };

    Ok(PointStore::from_parts(records, aabb, metadata))
}

/// Write a store to `path`
pub fn write_cache(path: &Path, store: &PointStore) -> Result<(), CloudError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, encode(store))?;
    log::info!("Wrote cache {} ({} points)", path.display(), store.len());
    Ok(())
}

/// Read a store from `path`
pub fn read_cache(path: &Path) -> Result<PointStore, CloudError> {
    let bytes = fs::read(path)?;
    let store = decode(&bytes)?;
    log::info!("Loaded cache {} ({} points)", path.display(), store.len());
    Ok(store)
}

/// Write the cache on a background thread
pub fn write_cache_in_background(
    path: PathBuf,
    store: Arc<PointStore>,
) -> Result<BackgroundTask<PathBuf>, CloudError> {
    BackgroundTask::spawn("cache", move || {
        write_cache(&path, &store)?;
        Ok(path)
    })
}

fn put_vec3(out: &mut Vec<u8>, v: Vec3) {
    out.extend_from_slice(&v.x.to_le_bytes());
    out.extend_from_slice(&v.y.to_le_bytes());
    out.extend_from_slice(&v.z.to_le_bytes());
}

/// Little-endian cursor over a byte slice
struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CloudError> {
        let end = self.offset + N;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or_else(|| CloudError::Parse(format!("cache truncated at byte {}", self.offset)))?;
        self.offset = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CloudError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, CloudError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, CloudError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32, CloudError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    fn vec3(&mut self) -> Result<Vec3, CloudError> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }
}
