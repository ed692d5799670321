//! Point cloud projection engine
//!
//! Points are projected straight to pixels by data-parallel kernels instead
//! of being rasterized. A frame goes through these stages:
//!
//! ```text
//! PointStore -> ChunkPartitioner -> {Morton keys -> RadixSorter, PointReducer}
//!            -> per-chunk buffers -> Projector (+ masks) -> FrameCompositor
//! ```
//!
//! ## Key Components
//!
//! - [`Dispatcher`] - The "device": a thread pool running one kernel at a time
//! - [`ChunkPartitioner`] - Splits a store into buffer-sized [`Chunk`]s
//! - [`RadixSorter`] - 30-pass LSD radix sort over Morton keys
//! - [`PointReducer`] - Iterative grid deduplication
//! - [`projector`] - Standard and high-quality projection paths
//! - [`MaskBuilder`] - Height and ground masks
//! - [`FrameCompositor`] - Resolved pixels to an RGBA [`Frame`]
//! - [`PointCloudEngine`] - Owns all of the above for one loaded cloud

mod error;
mod dispatch;
mod buffer;
mod chunking;
mod scan;
mod radix_sort;
mod reducer;
mod masks;
mod compositor;
mod palette;
mod config;
mod engine;
pub mod morton;
pub mod projector;

pub use error::ComputeError;
pub use dispatch::Dispatcher;
pub use buffer::{AtomicBufferU32, AtomicBufferU64};
pub use chunking::{Chunk, ChunkPartitioner};
pub use scan::exclusive_scan;
pub use radix_sort::RadixSorter;
pub use reducer::{PointReducer, ReductionReport};
pub use masks::{ground_mask, MaskBuilder, HeightFilterResult};
pub use compositor::{Frame, FrameCompositor};
pub use palette::Palette;
pub use config::{EngineConfig, VisualizationMode, ChunkOrder, DEFAULT_DEVICE_BUFFER_BYTES};
pub use engine::{PointCloudEngine, UploadReport};
pub use projector::{ColorSource, MaskFlags};
