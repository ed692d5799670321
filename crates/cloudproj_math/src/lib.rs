//! Math Library for point cloud projection
//!
//! This crate provides the small set of math types the projection engine
//! needs, shared by the CPU kernels and the GPU backend.
//!
//! ## Core Types
//!
//! - [`Vec3`] - 3D vector with x, y, z components
//! - [`Mat4`] - 4x4 column-major matrix for camera transforms
//! - [`Aabb`] - Axis-aligned bounding box that only grows
//!
//! ## Encodings
//!
//! - [`packing`] - unorm8x4 packing and order-preserving float bits
//! - [`morton`] - 30-bit Z-order keys

mod vec3;
mod aabb;
pub mod mat4;
pub mod packing;
pub mod morton;

pub use vec3::Vec3;
pub use aabb::Aabb;
pub use mat4::Mat4;
pub use packing::{pack_unorm4x8, unpack_unorm4x8, ordered_bits, from_ordered_bits};
pub use morton::{morton_encode, expand_bits_10, MORTON_BITS};
