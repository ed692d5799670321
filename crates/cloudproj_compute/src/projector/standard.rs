//! Standard projection path
//!
//! Every pixel holds one [`DepthCell`]. Each visible point atomically
//! lowers its pixel's cell; a final pass maps the winning slot back to a
//! record and writes its color. Because atomic-min is commutative, the
//! order in which chunks are dispatched never changes the image.

use crate::{AtomicBufferU64, Dispatcher, Frame, FrameCompositor};

use super::{locate_slot, project_point, ChunkBinding, ColorContext, DepthCell, ProjectionParams};

/// Kernels of the standard path
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardProjector;

impl StandardProjector {
    /// Per-pixel depth cells for a frame
    pub fn allocate(params: &ProjectionParams) -> AtomicBufferU64 {
        AtomicBufferU64::new(params.pixel_count(), DepthCell::EMPTY)
    }

    /// Clear every cell to "no hit"
    pub fn reset(dispatcher: &Dispatcher, cells: &AtomicBufferU64) {
        cells.fill(dispatcher, DepthCell::EMPTY);
    }

    /// Depth-test every point of one chunk
    pub fn project_chunk(
        dispatcher: &Dispatcher,
        binding: &ChunkBinding<'_>,
        params: &ProjectionParams,
        cells: &AtomicBufferU64,
    ) {
        let records = &binding.chunk.records;
        dispatcher.dispatch("standard::project", records.len(), |i| {
            if !binding.passes(i, params) {
                return;
            }
            if let Some(hit) = project_point(&params.view_proj, records[i].position, params.width, params.height) {
                cells.fetch_min(hit.pixel, DepthCell::encode(hit.depth, binding.base + i as u32));
            }
        });
    }

    /// Write the color of every pixel's winner
    pub fn resolve(
        dispatcher: &Dispatcher,
        cells: &AtomicBufferU64,
        bindings: &[ChunkBinding<'_>],
        params: &ProjectionParams,
        colors: &ColorContext<'_>,
        compositor: &FrameCompositor,
    ) -> Frame {
        compositor.compose_depth(dispatcher, cells, params.width, params.height, |slot| {
            let (owner, local) = locate_slot(bindings, slot)?;
            Some(colors.color(params.color_source, &bindings[owner].chunk.records[local]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::ColorSource;
    use crate::{Chunk, Palette};
    use cloudproj_core::{CloudMetadata, PointRecord};
    use cloudproj_math::{mat4, Aabb, Vec3};

    #[test]
    fn test_nearest_point_wins() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let chunk = Chunk::new(
            vec![
                PointRecord::new(Vec3::new(0.0, 0.0, 0.5), [255, 0, 0]),
                PointRecord::new(Vec3::new(0.0, 0.0, -0.5), [0, 255, 0]),
                PointRecord::new(Vec3::new(0.0, 0.0, 0.9), [0, 0, 255]),
            ],
            vec![0, 1, 2],
        );
        let bindings = [ChunkBinding::new(&chunk, 0)];
        let params = ProjectionParams::new(mat4::IDENTITY, 1, 1).with_color_source(ColorSource::Rgb);
        let palette = Palette::inferno();
        let colors = ColorContext {
            scene: Aabb::EMPTY,
            metadata: CloudMetadata::default(),
            palette: &palette,
        };

        let cells = StandardProjector::allocate(&params);
        StandardProjector::reset(&dispatcher, &cells);
        StandardProjector::project_chunk(&dispatcher, &bindings[0], &params, &cells);
        let frame = StandardProjector::resolve(
            &dispatcher,
            &cells,
            &bindings,
            &params,
            &colors,
            &FrameCompositor::new([0, 0, 0]),
        );
        assert_eq!(frame.rgb(0, 0), [0, 255, 0]);
    }

    #[test]
    fn test_equal_depth_lowest_slot_wins() {
        let dispatcher = Dispatcher::new(4).unwrap();
        let records: Vec<PointRecord> = (0..64)
            .map(|i| PointRecord::new(Vec3::ZERO, [i as u8, 0, 0]))
            .collect();
        let chunk = Chunk::new(records, (0..64).collect());
        let binding = ChunkBinding::new(&chunk, 100);
        let params = ProjectionParams::new(mat4::IDENTITY, 2, 2);

        let cells = StandardProjector::allocate(&params);
        StandardProjector::project_chunk(&dispatcher, &binding, &params, &cells);
        let hit = cells.to_vec().into_iter().find_map(DepthCell::decode).unwrap();
        assert_eq!(hit.1, 100);
    }
}
