//! Visibility and ground masks
//!
//! Masks hold one byte per store record (1 = keep) and are mapped into
//! chunk order through each chunk's `source_indices`, so they stay valid
//! after sorting and reduction.
//!
//! ## Height filter
//!
//! A `sx x sy` grid is laid over the scene's x/y extent. Each cell keeps the
//! point of minimum height, chosen with atomic-min over
//! `ordered_bits(z) << 32 | store_index`. The winners form the visibility
//! mask and, optionally, a grayscale heightmap (DTM) where alpha marks the
//! cells that received a point.

use std::path::Path;

use cloudproj_core::{CloudError, GroundClassifier, PointStore};
use cloudproj_math::morton::quantize;
use cloudproj_math::{from_ordered_bits, ordered_bits};
use image::{GrayAlphaImage, LumaA};

use crate::{AtomicBufferU32, AtomicBufferU64, ComputeError, Dispatcher};

const UNRESOLVED: u64 = u64::MAX;

/// Output of the height filter
#[derive(Clone, Debug)]
pub struct HeightFilterResult {
    /// One byte per store record, 1 for cell winners
    pub mask: Vec<u8>,
    pub columns: u32,
    pub rows: u32,
    /// Per cell: store index and height of the lowest point
    pub cells: Vec<Option<(u32, f32)>>,
    /// Height range used to normalize the heightmap
    pub z_range: (f32, f32),
}

impl HeightFilterResult {
    /// Number of cells that received at least one point
    pub fn resolved_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Grayscale heightmap, north (max y) at the top
    pub fn dtm_image(&self) -> GrayAlphaImage {
        let (z_min, z_max) = self.z_range;
        let extent = z_max - z_min;
        GrayAlphaImage::from_fn(self.columns, self.rows, |x, row| {
            let y = self.rows - 1 - row;
            match self.cells[(y * self.columns + x) as usize] {
                Some((_, z)) => {
                    let t = if extent > 0.0 { (z - z_min) / extent } else { 0.0 };
                    LumaA([(t.clamp(0.0, 1.0) * 255.0).round() as u8, 255])
                }
                None => LumaA([0, 0]),
            }
        })
    }

    /// Write the heightmap as PNG
    pub fn save_dtm(&self, path: &Path) -> Result<(), ComputeError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(CloudError::from)?;
        }
        self.dtm_image().save(path)?;
        log::info!("Saved {}x{} heightmap to {}", self.columns, self.rows, path.display());
        Ok(())
    }
}

/// Builds visibility and ground masks over a store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaskBuilder {
    pub columns: u32,
    pub rows: u32,
}

impl Default for MaskBuilder {
    fn default() -> Self {
        Self { columns: 100, rows: 100 }
    }
}

impl MaskBuilder {
    pub fn new(columns: u32, rows: u32) -> Result<Self, ComputeError> {
        if columns == 0 || rows == 0 {
            return Err(ComputeError::InvalidConfig(format!(
                "height filter grid must be non-empty, got {}x{}",
                columns, rows
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Keep the lowest point of every x/y cell
    pub fn height_filter(&self, dispatcher: &Dispatcher, store: &PointStore) -> HeightFilterResult {
        let records = store.records();
        let aabb = *store.aabb();
        let (columns, rows) = (self.columns, self.rows);
        let grid = AtomicBufferU64::new(columns as usize * rows as usize, UNRESOLVED);

        dispatcher.dispatch("height::min", records.len(), |i| {
            let p = aabb.normalize(records[i].position);
            let cell = quantize(p.y, rows) as usize * columns as usize + quantize(p.x, columns) as usize;
            let key = ((ordered_bits(records[i].position.z) as u64) << 32) | i as u64;
            grid.fetch_min(cell, key);
        });

        let mask = AtomicBufferU32::new(records.len(), 0);
        dispatcher.dispatch("height::mark", grid.len(), |c| {
            let key = grid.load(c);
            if key != UNRESOLVED {
                mask.store((key & 0xffff_ffff) as usize, 1);
            }
        });

        let cells = grid
            .to_vec()
            .into_iter()
            .map(|key| (key != UNRESOLVED).then(|| (key as u32, from_ordered_bits((key >> 32) as u32))))
            .collect();

        let result = HeightFilterResult {
            mask: mask.to_vec().into_iter().map(|m| m as u8).collect(),
            columns,
            rows,
            cells,
            z_range: (aabb.min.z, aabb.max.z),
        };
        log::info!(
            "Height filter kept {} of {} points ({}x{} grid)",
            result.resolved_cells(),
            records.len(),
            columns,
            rows
        );
        result
    }
}

/// Mask with 1 for every point the classifier reports as ground
pub fn ground_mask(store: &PointStore, classifier: &dyn GroundClassifier) -> Result<Vec<u8>, ComputeError> {
    let indices = classifier.classify(store)?;
    let mut mask = vec![0u8; store.len()];
    for index in indices {
        let slot = mask.get_mut(index as usize).ok_or_else(|| {
            CloudError::InvalidInput(format!(
                "ground index {} is outside a store of {} points",
                index,
                store.len()
            ))
        })?;
        *slot = 1;
    }
    Ok(mask)
}
