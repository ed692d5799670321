//! Point cloud engine
//!
//! [`PointCloudEngine`] owns the device, the uploaded chunks and the masks
//! of one point cloud. Uploading runs the preprocessing kernels once; each
//! call to [`PointCloudEngine::render`] then only projects and composes.

use std::sync::Arc;

use cloudproj_core::{CloudError, GroundClassifier, PointStore};
use cloudproj_math::{Aabb, Mat4};
use rayon::prelude::*;

use crate::projector::{
    ChunkBinding, ColorContext, HqrProjector, HqrTarget, ProjectionParams, StandardProjector,
};
use crate::{
    Chunk, ChunkOrder, ChunkPartitioner, ComputeError, Dispatcher, EngineConfig, Frame, FrameCompositor,
    ground_mask, HeightFilterResult, MaskBuilder, MaskFlags, Palette, PointReducer, RadixSorter,
    ReductionReport,
};

/// Summary of a [`PointCloudEngine::set_point_cloud`] call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub chunks: usize,
    pub points_in: usize,
    /// Points left on the device after reduction
    pub points_uploaded: usize,
    /// One report per chunk, empty when reduction is off
    pub reductions: Vec<ReductionReport>,
}

/// Mask over store indices with its per-chunk projections
#[derive(Clone, Debug)]
struct PointMask {
    per_chunk: Vec<Vec<u8>>,
}

impl PointMask {
    fn build(chunks: &[Chunk], mask: &[u8]) -> Self {
        Self {
            per_chunk: chunks.iter().map(|c| c.project_mask(mask)).collect(),
        }
    }

    fn chunk(&self, index: usize) -> Option<&[u8]> {
        self.per_chunk.get(index).map(Vec::as_slice)
    }
}

/// Projects one uploaded point cloud into frames
#[derive(Debug)]
pub struct PointCloudEngine {
    config: EngineConfig,
    dispatcher: Dispatcher,
    palette: Palette,
    compositor: FrameCompositor,
    store: Option<Arc<PointStore>>,
    chunks: Vec<Chunk>,
    /// Device slot of each chunk's first record
    bases: Vec<u32>,
    visibility: Option<PointMask>,
    ground: Option<PointMask>,
}

impl PointCloudEngine {
    /// Create an engine with no point cloud
    pub fn new(config: EngineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        let dispatcher = Dispatcher::new(config.worker_threads)?;
        log::info!(
            "Engine ready: {}x{}, {} device threads, {} records per chunk",
            config.width,
            config.height,
            dispatcher.threads(),
            config.chunk_capacity
        );
        Ok(Self {
            compositor: FrameCompositor::from_unit_color(config.background_color),
            config,
            dispatcher,
            palette: Palette::inferno(),
            store: None,
            chunks: Vec::new(),
            bases: Vec::new(),
            visibility: None,
            ground: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> Option<&Arc<PointStore>> {
        self.store.as_ref()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Total records on the device
    pub fn uploaded_points(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    /// Bounds of the whole uploaded cloud
    pub fn scene_aabb(&self) -> Aabb {
        self.store.as_ref().map(|s| *s.aabb()).unwrap_or_default()
    }

    /// Replace the configuration.
    ///
    /// Upload-time settings (chunk capacity, sort, reduce) only apply to
    /// the next [`set_point_cloud`](Self::set_point_cloud).
    pub fn set_config(&mut self, config: EngineConfig) -> Result<(), ComputeError> {
        config.validate()?;
        if config.worker_threads != self.config.worker_threads {
            self.dispatcher = Dispatcher::new(config.worker_threads)?;
        }
        let grid_changed = config.height_filter_grid != self.config.height_filter_grid;
        self.compositor = FrameCompositor::from_unit_color(config.background_color);
        self.config = config;

        if self.config.filter_by_height && (grid_changed || self.visibility.is_none()) && self.store.is_some() {
            self.filter_by_height()?;
        }
        Ok(())
    }

    /// Upload a point cloud: partition, sort, reduce and reset the masks
    pub fn set_point_cloud(&mut self, store: Arc<PointStore>) -> Result<UploadReport, ComputeError> {
        if u32::try_from(store.len()).is_err() {
            return Err(CloudError::InvalidInput(format!(
                "{} points exceed the 32-bit slot range",
                store.len()
            ))
            .into());
        }

        let partitioner = ChunkPartitioner::new(self.config.chunk_capacity)?;
        let mut chunks = partitioner.partition(&store);
        let scene = *store.aabb();

        let sorter = RadixSorter::default();
        let reducer = PointReducer::new(self.config.reduce_iterations, self.config.reduce_grid_resolution);
        let mut reductions = Vec::new();
        for (index, chunk) in chunks.iter_mut().enumerate() {
            if self.config.sort {
                sorter.sort_chunk(&self.dispatcher, chunk, &scene);
            }
            if self.config.reduce {
                let report = reducer.reduce(&self.dispatcher, chunk);
                log::debug!("Chunk {} reduced: {:?}", index, report.counts);
                reductions.push(report);
            }
        }

        let mut next = 0u32;
        self.bases = chunks
            .iter()
            .map(|c| {
                let base = next;
                next += c.len() as u32;
                base
            })
            .collect();

        let report = UploadReport {
            chunks: chunks.len(),
            points_in: store.len(),
            points_uploaded: next as usize,
            reductions,
        };
        log::info!(
            "Uploaded {} of {} points in {} chunks",
            report.points_uploaded,
            report.points_in,
            report.chunks
        );

        self.chunks = chunks;
        self.store = Some(store);
        self.clear_masks();

        if self.config.filter_by_height {
            self.filter_by_height()?;
        }
        Ok(report)
    }

    /// Drop the visibility and ground masks
    pub fn clear_masks(&mut self) {
        self.visibility = None;
        self.ground = None;
    }

    fn require_store(&self) -> Result<Arc<PointStore>, ComputeError> {
        self.store
            .clone()
            .ok_or_else(|| ComputeError::InvalidConfig("no point cloud uploaded".into()))
    }

    /// Build the visibility mask from the lowest point of each x/y cell
    pub fn filter_by_height(&mut self) -> Result<HeightFilterResult, ComputeError> {
        let store = self.require_store()?;
        let (columns, rows) = self.config.height_filter_grid;
        let result = MaskBuilder::new(columns, rows)?.height_filter(&self.dispatcher, &store);
        self.visibility = Some(PointMask::build(&self.chunks, &result.mask));
        Ok(result)
    }

    /// Build the ground mask; returns the number of ground points
    pub fn filter_by_ground(&mut self, classifier: &dyn GroundClassifier) -> Result<usize, ComputeError> {
        let store = self.require_store()?;
        let mask = ground_mask(&store, classifier)?;
        let count = mask.iter().filter(|&&m| m != 0).count();
        log::info!("Ground filter kept {} of {} points", count, store.len());
        self.ground = Some(PointMask::build(&self.chunks, &mask));
        Ok(count)
    }

    /// Install an externally built visibility mask over store indices
    pub fn set_visibility_mask(&mut self, mask: &[u8]) -> Result<(), ComputeError> {
        let store = self.require_store()?;
        if mask.len() != store.len() {
            return Err(ComputeError::MaskLength {
                expected: store.len(),
                actual: mask.len(),
            });
        }
        self.visibility = Some(PointMask::build(&self.chunks, mask));
        Ok(())
    }

    pub fn has_visibility_mask(&self) -> bool {
        self.visibility.is_some()
    }

    pub fn has_ground_mask(&self) -> bool {
        self.ground.is_some()
    }

    /// Per-frame kernel inputs for `view_proj`
    pub fn projection_params(&self, view_proj: &Mat4) -> ProjectionParams {
        let mut masks = MaskFlags::empty();
        masks.set(MaskFlags::VISIBILITY, self.config.filter_by_height);
        masks.set(MaskFlags::GROUND, self.config.filter_by_ground);
        ProjectionParams::new(*view_proj, self.config.width, self.config.height)
            .with_color_source(self.config.color_source())
            .with_class_range(self.config.class_range)
            .with_masks(masks)
            .with_distance_threshold(self.config.distance_threshold)
    }

    /// Chunks as bound to the kernels, sorted by base slot
    pub fn bindings(&self) -> Vec<ChunkBinding<'_>> {
        self.chunks
            .iter()
            .zip(&self.bases)
            .enumerate()
            .map(|(index, (chunk, &base))| {
                ChunkBinding::new(chunk, base)
                    .with_visibility(self.visibility.as_ref().and_then(|m| m.chunk(index)))
                    .with_ground(self.ground.as_ref().and_then(|m| m.chunk(index)))
            })
            .collect()
    }

    /// Color lookup for the current cloud
    pub fn color_context(&self) -> ColorContext<'_> {
        let (scene, metadata) = match &self.store {
            Some(store) => (*store.aabb(), store.metadata),
            None => (Aabb::EMPTY, Default::default()),
        };
        ColorContext {
            scene,
            metadata,
            palette: &self.palette,
        }
    }

    pub fn compositor(&self) -> &FrameCompositor {
        &self.compositor
    }

    /// Chunk indices in dispatch order
    fn dispatch_order(&self) -> Vec<usize> {
        let order = 0..self.chunks.len();
        match self.config.chunk_order {
            ChunkOrder::Ascending => order.collect(),
            ChunkOrder::Descending => order.rev().collect(),
        }
    }

    /// Run `pass` once per chunk in dispatch order
    fn for_each_chunk<F>(&self, bindings: &[ChunkBinding<'_>], pass: F)
    where
        F: Fn(&ChunkBinding<'_>) + Send + Sync,
    {
        let order = self.dispatch_order();
        if self.config.parallel_chunks {
            self.dispatcher
                .install(|| order.par_iter().for_each(|&c| pass(&bindings[c])));
        } else {
            order.iter().for_each(|&c| pass(&bindings[c]));
        }
    }

    /// Project every chunk with `view_proj` and compose the frame
    pub fn render(&self, view_proj: &Mat4) -> Result<Frame, ComputeError> {
        let params = self.projection_params(view_proj);
        if self.chunks.is_empty() {
            return Ok(Frame::filled(params.width, params.height, self.compositor.background));
        }

        let bindings = self.bindings();
        let colors = self.color_context();
        let d = &self.dispatcher;

        let frame = if self.config.hqr {
            let target = HqrTarget::new(&params);
            HqrProjector::reset(d, &target);
            self.for_each_chunk(&bindings, |b| HqrProjector::depth_pass(d, b, &params, &target));
            self.for_each_chunk(&bindings, |b| {
                HqrProjector::accumulate_pass(d, b, &params, &colors, &target)
            });
            HqrProjector::resolve(d, &target, &params, &self.compositor)
        } else {
            let cells = StandardProjector::allocate(&params);
            StandardProjector::reset(d, &cells);
            self.for_each_chunk(&bindings, |b| StandardProjector::project_chunk(d, b, &params, &cells));
            StandardProjector::resolve(d, &cells, &bindings, &params, &colors, &self.compositor)
        };
        log::debug!("Rendered {}x{} frame from {} chunks", frame.width(), frame.height(), bindings.len());
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudproj_core::PointRecord;
    use cloudproj_math::{mat4, Vec3};

    fn line_store(n: usize) -> Arc<PointStore> {
        let store: PointStore = (0..n)
            .map(|i| PointRecord::new(Vec3::new(i as f32, 0.0, 0.0), [i as u8, 0, 0]))
            .collect();
        Arc::new(store)
    }

    fn small_config() -> EngineConfig {
        EngineConfig {
            worker_threads: 2,
            ..EngineConfig::default()
        }
        .with_size(8, 8)
        .with_chunk_capacity(4)
    }

    #[test]
    fn test_upload_report() {
        let mut engine = PointCloudEngine::new(small_config()).unwrap();
        let report = engine.set_point_cloud(line_store(10)).unwrap();
        assert_eq!(report.chunks, 3);
        assert_eq!(report.points_in, 10);
        assert_eq!(report.points_uploaded, 10);
        assert!(report.reductions.is_empty());
        assert_eq!(engine.bases, vec![0, 4, 8]);
    }

    #[test]
    fn test_upload_with_reduction() {
        let mut engine = PointCloudEngine::new(small_config().with_reduce(1, 1)).unwrap();
        let report = engine.set_point_cloud(line_store(10)).unwrap();
        assert_eq!(report.reductions.len(), 3);
        assert_eq!(report.points_uploaded, 3);
        assert_eq!(engine.bases, vec![0, 1, 2]);
        assert_eq!(engine.uploaded_points(), 3);
    }

    #[test]
    fn test_empty_engine_renders_background() {
        let engine = PointCloudEngine::new(small_config().with_background([1.0, 0.0, 0.0])).unwrap();
        let frame = engine.render(&mat4::IDENTITY).unwrap();
        assert_eq!(frame.rgb(3, 3), [255, 0, 0]);
    }

    #[test]
    fn test_masks_need_a_cloud() {
        let mut engine = PointCloudEngine::new(small_config()).unwrap();
        assert!(engine.filter_by_height().is_err());
        assert!(engine.set_visibility_mask(&[]).is_err());
    }

    #[test]
    fn test_mask_length_checked() {
        let mut engine = PointCloudEngine::new(small_config()).unwrap();
        engine.set_point_cloud(line_store(5)).unwrap();
        let err = engine.set_visibility_mask(&[1, 1]).unwrap_err();
        assert!(matches!(err, ComputeError::MaskLength { expected: 5, actual: 2 }));
        engine.set_visibility_mask(&[1, 0, 1, 0, 1]).unwrap();
        assert!(engine.has_visibility_mask());
    }

    #[test]
    fn test_replacing_cloud_clears_masks() {
        let mut engine = PointCloudEngine::new(small_config()).unwrap();
        engine.set_point_cloud(line_store(5)).unwrap();
        engine.filter_by_height().unwrap();
        assert!(engine.has_visibility_mask());
        engine.set_point_cloud(line_store(6)).unwrap();
        assert!(!engine.has_visibility_mask());
    }

    #[test]
    fn test_auto_height_filter() {
        let mut config = small_config();
        config.filter_by_height = true;
        let mut engine = PointCloudEngine::new(config).unwrap();
        engine.set_point_cloud(line_store(5)).unwrap();
        assert!(engine.has_visibility_mask());
    }

    struct EvenClassifier;

    impl GroundClassifier for EvenClassifier {
        fn classify(&self, store: &PointStore) -> Result<Vec<u32>, CloudError> {
            Ok((0..store.len() as u32).filter(|i| i % 2 == 0).collect())
        }
    }

    #[test]
    fn test_ground_filter_leaves_visibility_alone() {
        let mut engine = PointCloudEngine::new(small_config()).unwrap();
        engine.set_point_cloud(line_store(7)).unwrap();
        assert_eq!(engine.filter_by_ground(&EvenClassifier).unwrap(), 4);
        assert!(engine.has_ground_mask());
        assert!(!engine.has_visibility_mask());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(PointCloudEngine::new(small_config().with_size(0, 0)).is_err());
    }
}
