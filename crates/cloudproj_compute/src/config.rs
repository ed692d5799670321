//! Engine configuration
//!
//! An [`EngineConfig`] is fixed for the lifetime of a
//! [`PointCloudEngine`](crate::PointCloudEngine); changing a value means
//! building a new config and calling `set_config`.

use serde::{Deserialize, Serialize};

use crate::chunking::capacity_for_bytes;
use crate::projector::{ColorSource, DEFAULT_DISTANCE_THRESHOLD};
use crate::ComputeError;

/// Default device buffer size: 128 MiB
pub const DEFAULT_DEVICE_BUFFER_BYTES: u64 = 128 * 1024 * 1024;

/// What the displayed color of a point encodes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationMode {
    #[default]
    Rgb,
    Normal,
    Height,
    Class,
}

impl VisualizationMode {
    /// Color source used by the kernels
    pub fn color_source(self, normalized_color: bool) -> ColorSource {
        match self {
            VisualizationMode::Rgb if normalized_color => ColorSource::RgbNormalized,
            VisualizationMode::Rgb => ColorSource::Rgb,
            VisualizationMode::Normal => ColorSource::Normal,
            VisualizationMode::Height => ColorSource::Height,
            VisualizationMode::Class => ColorSource::Class,
        }
    }
}

/// Order in which chunks are dispatched during a frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkOrder {
    #[default]
    Ascending,
    Descending,
}

/// Immutable settings of a [`PointCloudEngine`](crate::PointCloudEngine)
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Output size in pixels
    pub width: u32,
    pub height: u32,
    /// Background RGB in `[0, 1]`
    pub background_color: [f32; 3],
    /// Records per chunk
    pub chunk_capacity: usize,
    /// Sort each chunk by Morton key on upload
    pub sort: bool,
    /// Run the grid reducer on upload
    pub reduce: bool,
    pub reduce_iterations: u32,
    pub reduce_grid_resolution: u32,
    /// Use the high-quality path instead of the standard one
    pub hqr: bool,
    pub distance_threshold: f32,
    pub visualization_mode: VisualizationMode,
    pub normalized_color: bool,
    /// Half-open range of drawn class ids
    pub class_range: (u32, u32),
    /// Gate points by the height filter mask
    pub filter_by_height: bool,
    /// Gate points by the ground mask
    pub filter_by_ground: bool,
    pub height_filter_grid: (u32, u32),
    /// Dispatch chunks concurrently
    pub parallel_chunks: bool,
    pub chunk_order: ChunkOrder,
    /// Device threads (0 = one per core)
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            background_color: [0.4, 0.4, 0.4],
            chunk_capacity: capacity_for_bytes(DEFAULT_DEVICE_BUFFER_BYTES),
            sort: true,
            reduce: false,
            reduce_iterations: 1,
            reduce_grid_resolution: 1024,
            hqr: true,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            visualization_mode: VisualizationMode::Rgb,
            normalized_color: true,
            class_range: (0, 256),
            filter_by_height: false,
            filter_by_ground: false,
            height_filter_grid: (100, 100),
            parallel_chunks: false,
            chunk_order: ChunkOrder::Ascending,
            worker_threads: 0,
        }
    }
}

impl EngineConfig {
    /// Set the output size (builder pattern)
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = capacity;
        self
    }

    pub fn with_hqr(mut self, hqr: bool) -> Self {
        self.hqr = hqr;
        self
    }

    pub fn with_sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_reduce(mut self, iterations: u32, grid_resolution: u32) -> Self {
        self.reduce = iterations > 0;
        self.reduce_iterations = iterations;
        self.reduce_grid_resolution = grid_resolution;
        self
    }

    pub fn with_visualization(mut self, mode: VisualizationMode, normalized_color: bool) -> Self {
        self.visualization_mode = mode;
        self.normalized_color = normalized_color;
        self
    }

    pub fn with_chunk_order(mut self, order: ChunkOrder) -> Self {
        self.chunk_order = order;
        self
    }

    pub fn with_background(mut self, color: [f32; 3]) -> Self {
        self.background_color = color;
        self
    }

    /// Color source implied by the visualization settings
    pub fn color_source(&self) -> ColorSource {
        self.visualization_mode.color_source(self.normalized_color)
    }

    /// Reject values no kernel can work with
    pub fn validate(&self) -> Result<(), ComputeError> {
        let fail = |msg: String| Err(ComputeError::InvalidConfig(msg));
        if self.width == 0 || self.height == 0 {
            return fail(format!("output size {}x{} is empty", self.width, self.height));
        }
        if self.chunk_capacity == 0 {
            return fail("chunk capacity must be non-zero".into());
        }
        if !(self.distance_threshold >= 1.0) {
            return fail(format!("distance threshold {} must be >= 1", self.distance_threshold));
        }
        if self.class_range.0 > self.class_range.1 {
            return fail(format!("class range {:?} is reversed", self.class_range));
        }
        if self.height_filter_grid.0 == 0 || self.height_filter_grid.1 == 0 {
            return fail("height filter grid must be non-empty".into());
        }
        Ok(())
    }
}
