//! GPU backend for point projection
//!
//! This crate runs the standard projection path as wgpu compute kernels and
//! reads the result back into the same [`Frame`](cloudproj_compute::Frame)
//! type the CPU engine produces.
//!
//! ## Key Components
//!
//! - [`GpuContext`] - Headless wgpu device and queue
//! - [`GpuProjector`] - Reset, depth, index and color compute pipelines
//! - [`types`] - Pod layouts shared with `shaders/project.wgsl`

mod error;
mod context;
mod gpu_projector;
pub mod types;

pub use error::GpuError;
pub use context::{capacity_for_binding, GpuContext};
pub use gpu_projector::GpuProjector;
