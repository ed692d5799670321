//! Ground classification contract
//!
//! The engine only needs the indices of ground points; how they are found
//! is up to the classifier. [`CellMinimumClassifier`] is a simple stand-in
//! that keeps points close to the lowest point of their x/y cell.

use std::collections::HashMap;

use crate::{CloudError, PointStore};

/// Produces the store indices of ground points
pub trait GroundClassifier: Send + Sync {
    /// Indices into `store.records()` of every ground point
    fn classify(&self, store: &PointStore) -> Result<Vec<u32>, CloudError>;
}

/// A point is ground when its z lies within `tolerance` of the minimum z of
/// its `cell_size` x `cell_size` column
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellMinimumClassifier {
    pub cell_size: f32,
    pub tolerance: f32,
}

impl Default for CellMinimumClassifier {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            tolerance: 0.2,
        }
    }
}

impl CellMinimumClassifier {
    pub fn new(cell_size: f32, tolerance: f32) -> Self {
        Self { cell_size, tolerance }
    }
}

impl GroundClassifier for CellMinimumClassifier {
    fn classify(&self, store: &PointStore) -> Result<Vec<u32>, CloudError> {
        if !(self.cell_size > 0.0) {
            return Err(CloudError::InvalidInput(format!(
                "ground cell size must be positive, got {}",
                self.cell_size
            )));
        }
        let origin = store.aabb().min;
        let cell_of = |x: f32, y: f32| {
            (
                ((x - origin.x) / self.cell_size).floor() as i64,
                ((y - origin.y) / self.cell_size).floor() as i64,
            )
        };

        let mut lowest: HashMap<(i64, i64), f32> = HashMap::new();
        for p in store.positions() {
            let z = lowest.entry(cell_of(p.x, p.y)).or_insert(f32::INFINITY);
            *z = z.min(p.z);
        }

        let ground: Vec<u32> = store
            .positions()
            .enumerate()
            .filter(|(_, p)| {
                let min_z = lowest.get(&cell_of(p.x, p.y)).copied().unwrap_or(f32::INFINITY);
                p.z - min_z <= self.tolerance
            })
            .map(|(i, _)| i as u32)
            .collect();

        log::info!("Classified {} of {} points as ground", ground.len(), store.len());
        Ok(ground)
    }
}
