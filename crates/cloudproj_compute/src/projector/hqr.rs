//! High-quality projection path
//!
//! Two phases per frame:
//!
//! 1. Depth resolution: atomic-min of the order-preserving depth bits of
//!    every gated point, over all chunks.
//! 2. Accumulation: every gated point whose depth `d` satisfies
//!    `d <= resolved * distance_threshold` adds its color and a weight of
//!    one to its pixel.
//!
//! All depth passes finish before the first accumulation pass, so each
//! chunk is compared against the final nearest depth.

use cloudproj_math::{from_ordered_bits, ordered_bits};

use crate::{AtomicBufferU32, AtomicBufferU64, Dispatcher, Frame, FrameCompositor};

use super::{project_point, AccumulationCell, ChunkBinding, ColorContext, ProjectionParams};

const NO_DEPTH: u32 = u32::MAX;

/// Per-pixel state of the high-quality path
#[derive(Debug)]
pub struct HqrTarget {
    pub depth: AtomicBufferU32,
    pub accum_a: AtomicBufferU64,
    pub accum_b: AtomicBufferU64,
}

impl HqrTarget {
    pub fn new(params: &ProjectionParams) -> Self {
        let n = params.pixel_count();
        Self {
            depth: AtomicBufferU32::new(n, NO_DEPTH),
            accum_a: AtomicBufferU64::new(n, 0),
            accum_b: AtomicBufferU64::new(n, 0),
        }
    }

    /// Nearest resolved depth of `pixel`, if any point reached it
    pub fn resolved_depth(&self, pixel: usize) -> Option<f32> {
        match self.depth.load(pixel) {
            NO_DEPTH => None,
            bits => Some(from_ordered_bits(bits)),
        }
    }
}

/// Kernels of the high-quality path
#[derive(Clone, Copy, Debug, Default)]
pub struct HqrProjector;

impl HqrProjector {
    pub fn reset(dispatcher: &Dispatcher, target: &HqrTarget) {
        target.depth.fill(dispatcher, NO_DEPTH);
        target.accum_a.fill(dispatcher, 0);
        target.accum_b.fill(dispatcher, 0);
    }

    /// Phase 1 for one chunk
    pub fn depth_pass(
        dispatcher: &Dispatcher,
        binding: &ChunkBinding<'_>,
        params: &ProjectionParams,
        target: &HqrTarget,
    ) {
        let records = &binding.chunk.records;
        dispatcher.dispatch("hqr::depth", records.len(), |i| {
            if !binding.passes(i, params) {
                return;
            }
            if let Some(hit) = project_point(&params.view_proj, records[i].position, params.width, params.height) {
                target.depth.fetch_min(hit.pixel, ordered_bits(hit.depth));
            }
        });
    }

    /// Phase 2 for one chunk
    pub fn accumulate_pass(
        dispatcher: &Dispatcher,
        binding: &ChunkBinding<'_>,
        params: &ProjectionParams,
        colors: &ColorContext<'_>,
        target: &HqrTarget,
    ) {
        let records = &binding.chunk.records;
        dispatcher.dispatch("hqr::accumulate", records.len(), |i| {
            if !binding.passes(i, params) {
                return;
            }
            let Some(hit) = project_point(&params.view_proj, records[i].position, params.width, params.height) else {
                return;
            };
            let Some(resolved) = target.resolved_depth(hit.pixel) else { return };
            if hit.depth <= resolved * params.distance_threshold {
                let (a, b) = AccumulationCell::encode(colors.color(params.color_source, &records[i]));
                target.accum_a.fetch_add(hit.pixel, a);
                target.accum_b.fetch_add(hit.pixel, b);
            }
        });
    }

    /// Average the accumulators into a frame
    pub fn resolve(
        dispatcher: &Dispatcher,
        target: &HqrTarget,
        params: &ProjectionParams,
        compositor: &FrameCompositor,
    ) -> Frame {
        compositor.compose_accumulation(dispatcher, &target.accum_a, &target.accum_b, params.width, params.height)
    }
}
