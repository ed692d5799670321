//! Normal estimation from k nearest neighbours
//!
//! Neighbours are found through a uniform hash grid whose cell size is
//! picked so that a cell holds roughly `k` points. The normal of a point is
//! the eigenvector of the smallest eigenvalue of its neighbourhood
//! covariance, flipped to point towards +z.

use std::collections::HashMap;

use cloudproj_math::{Aabb, Vec3};
use rayon::prelude::*;

use crate::{CloudError, PointStore};

/// Neighbour count used when none is configured
pub const DEFAULT_KNN: usize = 8;

/// Smallest neighbourhood that defines a plane
pub const MIN_KNN: usize = 3;

type CellKey = (i32, i32, i32);

struct HashGrid<'a> {
    points: &'a [Vec3],
    origin: Vec3,
    cell_size: f32,
    max_ring: i32,
    cells: HashMap<CellKey, Vec<u32>>,
}

impl<'a> HashGrid<'a> {
    fn new(points: &'a [Vec3], aabb: &Aabb, k: usize) -> Self {
        let cell_size = cell_size_for(aabb, points.len(), k);
        let extent = aabb.size();
        let cells_along = |e: f32| (e / cell_size).ceil() as i32 + 1;
        let max_ring = cells_along(extent.x).max(cells_along(extent.y)).max(cells_along(extent.z));

        let mut grid = Self {
            points,
            origin: aabb.min,
            cell_size,
            max_ring,
            cells: HashMap::new(),
        };
        for (i, p) in points.iter().enumerate() {
            let key = grid.key(*p);
            grid.cells.entry(key).or_default().push(i as u32);
        }
        grid
    }

    fn key(&self, p: Vec3) -> CellKey {
        let rel = (p - self.origin) / self.cell_size;
        (rel.x.floor() as i32, rel.y.floor() as i32, rel.z.floor() as i32)
    }

    /// Indices of the `k` nearest points to `points[index]`, excluding itself
    fn nearest(&self, index: usize, k: usize) -> Vec<u32> {
        let center = self.points[index];
        let (cx, cy, cz) = self.key(center);
        let mut candidates: Vec<(f32, u32)> = Vec::new();

        for ring in 0..=self.max_ring {
            for dx in -ring..=ring {
                for dy in -ring..=ring {
                    for dz in -ring..=ring {
                        if dx.abs().max(dy.abs()).max(dz.abs()) != ring {
                            continue;
                        }
                        let Some(cell) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) else { continue };
                        for &j in cell {
                            if j as usize != index {
                                let d = (self.points[j as usize] - center).length_squared();
                                candidates.push((d, j));
                            }
                        }
                    }
                }
            }

            // Everything within `ring` cell widths has been visited
            let reach = ring as f32 * self.cell_size;
            let settled = candidates.iter().filter(|(d, _)| *d <= reach * reach).count();
            if settled >= k {
                break;
            }
        }

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        candidates.truncate(k);
        candidates.into_iter().map(|(_, j)| j).collect()
    }
}

/// Cell edge so that a cell holds about `k` points, using only the axes
/// with non-zero extent
fn cell_size_for(aabb: &Aabb, count: usize, k: usize) -> f32 {
    let size = aabb.size();
    let extents: Vec<f32> = [size.x, size.y, size.z].into_iter().filter(|e| *e > 0.0).collect();
    if extents.is_empty() || count == 0 {
        return 1.0;
    }
    let measure: f64 = extents.iter().map(|e| *e as f64).product();
    let per_cell = measure * k as f64 / count as f64;
    let edge = per_cell.powf(1.0 / extents.len() as f64) as f32;
    if edge.is_finite() && edge > 0.0 {
        edge
    } else {
        1.0
    }
}

/// Unit normal of a neighbourhood, oriented to +z
pub fn fit_normal(points: &[Vec3]) -> Option<Vec3> {
    if points.len() < MIN_KNN {
        return None;
    }
    let n = points.len() as f64;
    let mean = points.iter().fold([0.0f64; 3], |acc, p| {
        [acc[0] + p.x as f64, acc[1] + p.y as f64, acc[2] + p.z as f64]
    });
    let mean = mean.map(|v| v / n);

    let mut cov = [[0.0f64; 3]; 3];
    for p in points {
        let d = [p.x as f64 - mean[0], p.y as f64 - mean[1], p.z as f64 - mean[2]];
        for (r, row) in cov.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value += d[r] * d[c] / n;
            }
        }
    }

    let v = smallest_eigenvector(&cov)?;
    let normal = Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32).normalized();
    Some(if normal.z < 0.0 { -normal } else { normal })
}

/// Eigenvector of the smallest eigenvalue of a symmetric 3x3 matrix
fn smallest_eigenvector(a: &[[f64; 3]; 3]) -> Option<[f64; 3]> {
    let p1 = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
    let trace = a[0][0] + a[1][1] + a[2][2];
    if trace.abs() < f64::EPSILON {
        return None;
    }

    if p1 <= f64::EPSILON * trace * trace {
        // Already diagonal
        let axis = (0..3)
            .min_by(|&i, &j| a[i][i].total_cmp(&a[j][j]))
            .unwrap_or(2);
        let mut v = [0.0; 3];
        v[axis] = 1.0;
        return Some(v);
    }

    let q = trace / 3.0;
    let p2 = (a[0][0] - q).powi(2) + (a[1][1] - q).powi(2) + (a[2][2] - q).powi(2) + 2.0 * p1;
    let p = (p2 / 6.0).sqrt();
    let mut b = *a;
    for (i, row) in b.iter_mut().enumerate() {
        row[i] -= q;
        for value in row.iter_mut() {
            *value /= p;
        }
    }
    let r = (det3(&b) / 2.0).clamp(-1.0, 1.0);
    let phi = r.acos() / 3.0;
    let smallest = q + 2.0 * p * (phi + 2.0 * std::f64::consts::PI / 3.0).cos();

    let mut m = *a;
    for (i, row) in m.iter_mut().enumerate() {
        row[i] -= smallest;
    }
    let candidates = [cross(m[0], m[1]), cross(m[0], m[2]), cross(m[1], m[2])];
    let best = candidates
        .into_iter()
        .max_by(|x, y| norm2(*x).total_cmp(&norm2(*y)))?;
    let len = norm2(best).sqrt();
    if len <= 1e-12 {
        return None;
    }
    Some(best.map(|c| c / len))
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm2(v: [f64; 3]) -> f64 {
    v[0] * v[0] + v[1] * v[1] + v[2] * v[2]
}

/// Estimate a normal for every point from its `k` nearest neighbours.
///
/// Points whose neighbourhood is degenerate get +z.
pub fn estimate_normals(points: &[Vec3], aabb: &Aabb, k: usize) -> Result<Vec<Vec3>, CloudError> {
    if k < MIN_KNN {
        return Err(CloudError::InvalidInput(format!(
            "knn must be at least {}, got {}",
            MIN_KNN, k
        )));
    }
    let grid = HashGrid::new(points, aabb, k);
    let normals = (0..points.len())
        .into_par_iter()
        .map(|i| {
            let mut neighbourhood: Vec<Vec3> = grid
                .nearest(i, k)
                .into_iter()
                .map(|j| points[j as usize])
                .collect();
            neighbourhood.push(points[i]);
            fit_normal(&neighbourhood).unwrap_or(Vec3::Z)
        })
        .collect();
    Ok(normals)
}

/// Compute normals for every record of `store` and mark them computed
pub fn compute_normals(store: &mut PointStore, k: usize) -> Result<(), CloudError> {
    let positions: Vec<Vec3> = store.positions().collect();
    let normals = estimate_normals(&positions, store.aabb(), k)?;
    store.set_normals(&normals);
    log::info!("Computed normals for {} points (k = {})", store.len(), k);
    Ok(())
}
