//! Core types for the cloudproj engine
//!
//! This crate owns everything about a point cloud that lives on the CPU:
//!
//! - [`PointRecord`] - One 32-byte point as uploaded to device buffers
//! - [`PointStore`] - All records of a dataset plus bounds and radiometric metadata
//! - [`cache`] - The fixed binary cache file format
//! - [`loaders`] - PLY and LAS/LAZ source loaders and the cache-first load order
//! - [`export`] - PLY export of positions and colors
//! - [`BackgroundTask`] - Joinable handle for work pushed off the control thread
//! - [`normals`] - kNN normal estimation
//! - [`GroundClassifier`] - Contract for external ground classification
//! - [`SceneTree`] - Arena of drawables with index-based children

mod error;
mod point;
mod store;
mod task;
mod ground;
mod scene;
pub mod cache;
pub mod loaders;
pub mod export;
pub mod normals;

pub use error::CloudError;
pub use point::{PointRecord, ReturnClass, POINT_RECORD_SIZE};
pub use store::{PointStore, CloudMetadata, SourceChannels};
pub use task::BackgroundTask;
pub use ground::{GroundClassifier, CellMinimumClassifier};
pub use scene::{SceneTree, SceneNode, NodeKey, Drawable, PlacedCloud};
pub use loaders::{load_point_cloud, LoadOptions, LoadedCloud, LoadSource};

// Re-export commonly used types from cloudproj_math for convenience
pub use cloudproj_math::{Vec3, Aabb, Mat4};
